use bson::{Bson, Document};
use dbcompass_core::ColumnDescriptor;
use indexmap::IndexMap;

/// How many documents to sample when inferring a collection's shape.
pub const SAMPLE_SIZE: usize = 10;

#[derive(Default)]
struct FieldState {
    observed_type: Option<&'static str>,
    mixed: bool,
}

/// Infers per-field type descriptors from sampled documents.
///
/// A field never observed non-null reports `null`; a field whose non-null
/// observations all agree reports that scalar type; disagreement across
/// documents reports `mixed`. Collections are schema-less, so every field
/// is nullable. Fields come out in first-seen order.
pub fn infer_columns(docs: &[Document]) -> Vec<ColumnDescriptor> {
    let mut fields: IndexMap<String, FieldState> = IndexMap::new();

    for doc in docs {
        for (name, value) in doc {
            let state = fields.entry(name.clone()).or_default();
            if matches!(value, Bson::Null | Bson::Undefined) {
                continue;
            }
            let observed = bson_type_name(value);
            match state.observed_type {
                None => state.observed_type = Some(observed),
                Some(existing) if existing == observed => {}
                Some(_) => state.mixed = true,
            }
        }
    }

    fields
        .into_iter()
        .map(|(name, state)| {
            let data_type = if state.mixed {
                "mixed"
            } else {
                state.observed_type.unwrap_or("null")
            };
            ColumnDescriptor::new(name, data_type)
        })
        .collect()
}

fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "bool",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "date",
        Bson::Decimal128(_) => "decimal",
        Bson::Binary(_) => "binData",
        Bson::Timestamp(_) => "timestamp",
        Bson::RegularExpression(_) => "regex",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn agreeing_observations_report_the_scalar_type() {
        let docs = vec![
            doc! { "name": "a", "age": 30 },
            doc! { "name": "b", "age": 41 },
        ];

        let columns = infer_columns(&docs);
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "name");
        assert_eq!(columns[0].data_type, "string");
        assert_eq!(columns[1].data_type, "int");
    }

    #[test]
    fn disagreeing_observations_report_mixed() {
        let docs = vec![doc! { "value": 1 }, doc! { "value": "one" }];

        let columns = infer_columns(&docs);
        assert_eq!(columns[0].data_type, "mixed");
    }

    #[test]
    fn never_non_null_reports_null() {
        let docs = vec![doc! { "ghost": Bson::Null }, doc! { "ghost": Bson::Null }];

        let columns = infer_columns(&docs);
        assert_eq!(columns[0].data_type, "null");
    }

    #[test]
    fn nulls_do_not_break_an_agreed_type() {
        let docs = vec![doc! { "email": Bson::Null }, doc! { "email": "x@y.z" }];

        let columns = infer_columns(&docs);
        assert_eq!(columns[0].data_type, "string");
        assert!(columns[0].nullable);
    }

    #[test]
    fn fields_come_out_in_first_seen_order() {
        let docs = vec![doc! { "b": 1, "a": 2 }, doc! { "c": 3 }];

        let names: Vec<String> = infer_columns(&docs).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn inferred_fields_are_always_nullable() {
        let docs = vec![doc! { "id": 1 }];
        let columns = infer_columns(&docs);
        assert!(columns.iter().all(|c| c.nullable));
    }

    #[test]
    fn sample_size_matches_the_ten_document_contract() {
        assert_eq!(SAMPLE_SIZE, 10);
    }
}

mod driver;
mod schema_sample;

pub use driver::MongoAdapter;

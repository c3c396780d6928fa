mod driver;

pub use driver::PostgresAdapter;

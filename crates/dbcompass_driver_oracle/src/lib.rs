mod driver;

pub use driver::OracleAdapter;

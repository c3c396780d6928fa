mod driver;

pub use driver::MssqlAdapter;

mod postgres;

pub use postgres::connect;

pub mod connection;
pub mod echo;
pub mod endpoint;
pub mod metered;
pub mod pool;
pub mod supervisor;

pub mod allocator;
pub mod migrations;
pub mod pool;
pub mod users;

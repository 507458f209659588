pub mod core;
pub mod io;
pub mod memory;

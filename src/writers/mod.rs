pub mod colocated_writer;

pub use colocated_writer::{ColocatedWriter, FileInfo};

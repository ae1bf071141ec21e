pub mod files;
pub mod manifest_file;
pub mod memory;
pub mod terminal;
pub mod words;

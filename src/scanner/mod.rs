pub mod module_filter;
pub mod module_scanner;

pub use module_filter::{is_module_unsigned_encrypted, ModuleFilter};
pub use module_scanner::{DeviceScan, ModuleFile, ModuleScanner, SkipReason, SkippedModule};

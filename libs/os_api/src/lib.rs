mod error;
mod process;
pub use error::OsError;
pub use process::PriorityClass;

#[cfg(target_os = "windows")]
mod windows;
#[cfg(target_os = "linux")]
mod linux;
#[cfg(not(any(target_os = "windows", target_os = "linux")))]
mod fallback;

// Export the implementation for the current platform under a common name
#[cfg(target_os = "windows")]
pub use windows::OS;
#[cfg(target_os = "linux")]
pub use linux::OS;
#[cfg(not(any(target_os = "windows", target_os = "linux")))]
pub use fallback::OS;

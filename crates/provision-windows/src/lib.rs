// Windows install strategies. These only build command lines for `cmd /C`,
// so they compile and test on any host.

pub mod msi;
pub mod zip;

pub use msi::MsiInstaller;
pub use zip::ZipInstaller;

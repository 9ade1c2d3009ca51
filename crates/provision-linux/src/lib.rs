// Linux install strategies

pub mod tgz;

pub use tgz::TgzInstaller;

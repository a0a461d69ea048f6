//! System interaction modules: command execution, detection, services,
//! firewall, sysctl, links, DHCP clients and configuration templates.

pub mod backup;
pub mod command;
pub mod detect;
pub mod dhcp;
pub mod firewall;
pub mod network;
pub mod services;
pub mod sysctl;
pub mod templates;

pub use command::{CommandRunner, SystemRunner};
pub use detect::Detector;

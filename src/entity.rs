pub mod client_traffic;
pub mod inbound;
pub mod setting;

pub use client_traffic::Entity as ClientTraffic;
pub use inbound::Entity as Inbound;
pub use setting::Entity as Setting;

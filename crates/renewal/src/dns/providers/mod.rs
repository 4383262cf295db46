//! DNS provider plugins

mod cloudflare;
mod hetzner;

pub use cloudflare::{CloudflareProvider, CLOUDFLARE_API_BASE};
pub use hetzner::{HetznerProvider, HETZNER_API_BASE};

#![allow(dead_code)]

pub mod relay;
pub mod smtp_server;

use courier_dispatch::{DispatchOptions, MessageJob, RelayConfig, Security};

pub fn jobs(count: usize) -> Vec<MessageJob> {
    (0..count)
        .map(|index| {
            MessageJob::new(
                index,
                format!("Recipient {index} <r{index}@example.com>"),
                format!("Message {index}"),
                "<p>Hello</p>",
            )
        })
        .collect()
}

pub fn relay_config() -> RelayConfig {
    let mut config = RelayConfig::new("smtp.example.com", 587, "news@acme.test");
    config.from_name = Some("Acme News".to_string());
    config
}

/// A relay config pointing at a plaintext loopback server.
pub fn loopback_config(port: u16) -> RelayConfig {
    let mut config = RelayConfig::new("127.0.0.1", port, "news@acme.test");
    config.security = Security::Plain;
    config.username = Some("acme".to_string());
    config.password = Some("s3cret".to_string());
    config.from_name = Some("Acme News".to_string());
    config
}

/// Defaults with the rate limiter off and no pause between chunks.
pub fn fast_options() -> DispatchOptions {
    DispatchOptions {
        emails_per_second: 0,
        delay_between_chunks_ms: 0,
        ..DispatchOptions::default()
    }
}

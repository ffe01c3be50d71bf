//! One-shot Echo probe against loopback, printing the parsed reply.
//!
//! Needs raw-socket privileges:
//!
//! ```text
//! sudo -E cargo run --example ping
//! ```

use wardmon_net::{IcmpProbe, ProbeKind};

#[tokio::main]
async fn main() -> wardmon_core::Result<()> {
    let mut probe = IcmpProbe::new("127.0.0.1", "127.0.0.1", ProbeKind::echo())?;
    probe.exchange().await?;

    let response = probe.response().expect("exchange completed");
    println!("{}", serde_json::to_string_pretty(response).unwrap());
    println!("reply good: {}", probe.reply_good());
    Ok(())
}

//! Namespaces command implementation

use anyhow::{Context, Result};
use nsmove_netns::{list_named, ProcessNetNs, RelocationConfig};

pub fn execute(config: &RelocationConfig, pid: Option<u32>) -> Result<()> {
    let target_pid = pid.unwrap_or_else(std::process::id);

    let process = ProcessNetNs::for_pid(target_pid)
        .context("Failed to get network namespace information")?;

    println!("\n🔒 Network Namespace for PID {target_pid}");
    println!("{:-<60}", "");
    println!("Link:      {}", process.link);
    println!("Identity:  {}", process.id);

    let named = list_named(&config.netns_dir).with_context(|| {
        format!(
            "Failed to list named namespaces in {}",
            config.netns_dir.display()
        )
    })?;

    println!("\n📂 Named Namespaces in {}", config.netns_dir.display());
    println!("{:-<60}", "");
    if named.is_empty() {
        println!("(none)");
    }
    for ns in &named {
        let identity = ns
            .id
            .map_or_else(|| "unreadable".to_string(), |id| id.to_string());
        let marker = if ns.id == Some(process.id) {
            "  ← this process"
        } else {
            ""
        };
        println!("{:<24} {identity}{marker}", ns.name);
    }

    Ok(())
}

//! Tools command handler: adapter discovery snapshot

use crate::adapters::{builtin_adapters, discover};
use crate::commands::CommandContext;
use crate::error::Result;

/// Run the tools command
pub fn run_tools(_ctx: &CommandContext) -> Result<String> {
    let discovered = discover(builtin_adapters());
    let mut output = String::from("adapter   status      version\n");
    let any = discovered.iter().any(|d| d.available);
    for adapter in &discovered {
        output.push_str(&format!(
            "{:<9} {:<11} {}\n",
            adapter.info.name,
            if adapter.available { "available" } else { "absent" },
            adapter.info.version.as_deref().unwrap_or("-")
        ));
    }
    if !any {
        output.push_str("\nno adapters found; scans will run at tier 1 (heuristics + git only)\n");
    }
    Ok(output)
}

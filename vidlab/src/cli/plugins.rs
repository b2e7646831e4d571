use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use vidcore::PluginRegistry;
use vidcore::property::Access;
use vidcore::source::RepeaterRegistry;

#[derive(Parser, Debug, Default)]
pub struct PluginsCommand {
    /// Also list each plugin's properties
    #[arg(short, long)]
    pub properties: bool,
}

impl PluginsCommand {
    pub async fn run(self) -> Result<()> {
        let registry = PluginRegistry::with_builtin_filters(Arc::new(RepeaterRegistry::new()));

        for info in registry.plugins() {
            println!("{:<14} {}", info.id, info.description);
            if !self.properties {
                continue;
            }

            let plugin = registry.create(&info.id)?;
            for descriptor in plugin.properties() {
                let mut notes = Vec::new();
                if descriptor.access == Access::ReadOnly {
                    notes.push("read only".to_string());
                }
                if let Some((min, max)) = descriptor.range {
                    notes.push(format!("{min}..={max}"));
                }
                let current = plugin
                    .get_property(descriptor.name)
                    .map(|value| format!(" = {value:?}"))
                    .unwrap_or_default();

                println!(
                    "    {:<20} {:<8} {}{}{}",
                    descriptor.name,
                    descriptor.value_type.name(),
                    descriptor.description,
                    if notes.is_empty() {
                        String::new()
                    } else {
                        format!(" [{}]", notes.join(", "))
                    },
                    current
                );
            }
        }
        Ok(())
    }
}

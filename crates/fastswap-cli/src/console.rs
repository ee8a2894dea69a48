//! Interactive console for the embedded host
//!
//! Lines starting with `/` are commands, everything else is chat.

use std::sync::Arc;

use colored::Colorize;
use tracing::debug;

use fastswap_runtime::trigger::CONFIG_RELOAD_LABEL;
use fastswap_runtime::{
    ChatTrigger, CommandTrigger, ConfigReloadCommand, EmbeddedHost, ModuleHost, Notice,
    ReloadOrchestrator, Requester,
};

/// The operator at the terminal. Holds every permission.
pub struct ConsoleRequester;

impl Requester for ConsoleRequester {
    fn name(&self) -> &str {
        "console"
    }

    fn has_permission(&self, _node: &str) -> bool {
        true
    }

    fn notify(&self, notice: Notice, message: &str) {
        match notice {
            Notice::Progress => println!("{} {}", "→".yellow(), message),
            Notice::Success => println!("{} {}", "✓".green(), message),
            Notice::Failure => println!("{} {}", "✗".red(), message.red()),
        }
    }
}

/// What the read loop should do after a line
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

pub struct Console {
    host: Arc<EmbeddedHost>,
    orchestrator: Arc<ReloadOrchestrator>,
    reload: CommandTrigger,
    chat: ChatTrigger,
    config_reload: ConfigReloadCommand,
    requester: Arc<ConsoleRequester>,
}

impl Console {
    pub fn new(
        host: Arc<EmbeddedHost>,
        orchestrator: Arc<ReloadOrchestrator>,
        config_reload: ConfigReloadCommand,
    ) -> Self {
        Self {
            host,
            reload: CommandTrigger::new(Arc::clone(&orchestrator)),
            chat: ChatTrigger::new(Arc::clone(&orchestrator)),
            orchestrator,
            config_reload,
            requester: Arc::new(ConsoleRequester),
        }
    }

    pub async fn handle_line(&self, line: &str) -> Flow {
        let line = line.trim();
        if line.is_empty() {
            return Flow::Continue;
        }

        let Some(command) = line.strip_prefix('/') else {
            self.handle_chat(line);
            return Flow::Continue;
        };

        let Some((label, args)) = split_command(command) else {
            return Flow::Continue;
        };

        match label.to_lowercase().as_str() {
            "stop" | "quit" | "exit" => return Flow::Stop,
            "help" => print_help(),
            "modules" | "plugins" => self.print_modules(),
            "complete" => self.print_completions(&args),
            l if l == CONFIG_RELOAD_LABEL || l == format!("fastswap:{}", CONFIG_RELOAD_LABEL) => {
                if let Err(e) = self.config_reload.on_command(self.requester.as_ref()) {
                    debug!("Configuration reload failed: {}", e);
                }
            }
            l if CommandTrigger::matches(l) => {
                match self.reload.on_command(self.requester.clone(), &args) {
                    Ok(pending) => {
                        // Failures were already reported through notify.
                        if let Err(e) = pending.outcome().await {
                            debug!("Reload finished with error: {}", e);
                        }
                    }
                    Err(e) => debug!("Reload was not scheduled: {}", e),
                }
            }
            _ => self.dispatch(label),
        }
        Flow::Continue
    }

    fn handle_chat(&self, message: &str) {
        if !self.chat.on_chat(self.requester.clone(), message) {
            println!("<{}> {}", self.requester.name(), message);
        }
    }

    fn dispatch(&self, label: &str) {
        match self.host.dispatch(label) {
            Some(binding) => println!(
                "{} /{} handled by {}",
                "→".green(),
                binding.label(),
                binding.owner().cyan()
            ),
            None => println!("{} Unknown command /{}", "✗".red(), label),
        }
    }

    fn print_modules(&self) {
        let names = self.orchestrator.module_names();
        let rendered: Vec<String> = names
            .iter()
            .map(|name| {
                if self.host.is_module_enabled(name) {
                    name.green().to_string()
                } else {
                    name.red().to_string()
                }
            })
            .collect();
        println!("Modules ({}): {}", names.len(), rendered.join(", "));
    }

    fn print_completions(&self, args: &[&str]) {
        let Some((label, rest)) = args.split_first() else {
            return;
        };
        if !CommandTrigger::matches(label) {
            return;
        }
        // An empty current argument when only the label was given
        let current = if rest.is_empty() { &[""][..] } else { rest };
        println!("{}", self.reload.tab_complete(current).join("  "));
    }
}

/// Label and arguments of a command line without its `/`.
///
/// Splits on single spaces so runs of spaces survive into the arguments,
/// which the reload command joins back verbatim.
fn split_command(command: &str) -> Option<(&str, Vec<&str>)> {
    let mut parts = command.split(' ');
    let label = parts.next().filter(|label| !label.is_empty())?;
    Some((label, parts.collect()))
}

fn print_help() {
    println!("{}", "Commands".bold());
    println!("  /reload [module]   reload every module, or just one (aliases /rl, /r)");
    println!("  /{}     re-read the configuration file", CONFIG_RELOAD_LABEL);
    println!("  /modules           list loaded modules");
    println!("  /complete reload <prefix>   module name completions");
    println!("  /stop              shut down");
    println!("Anything else is chat; r, rl and reload reload the host when in-chat reload is on.");
}

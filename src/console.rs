use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::client::AgentApi;
use crate::conversation::{ConversationConfig, Message, Role};
use crate::dashboard::{BroadcastReport, Dashboard};
use crate::panel::{ConversationPanel, PanelError};
use crate::settings::{AgentKey, DashboardDefaults};

const HELP: &str = "\
  <text>              send to both agents
  /1 <text>           send to the first agent only
  /2 <text>           send to the second agent only
  /clear [1|2]        clear one or both histories
  /thread <1|2> <id>  switch conversation (clears that panel)
  /max <1|2> <n>      change history bound, 10..=1000 (clears that panel)
  /status             show both panels
  /quit";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Broadcast(String),
    Send(AgentKey, String),
    Clear(Option<AgentKey>),
    Thread(AgentKey, String),
    Max(AgentKey, usize),
    Status,
    Help,
    Quit,
    Nothing,
}

fn agent_arg(arg: Option<&str>) -> Result<AgentKey, String> {
    match arg {
        Some("1") => Ok(AgentKey::Agent1),
        Some("2") => Ok(AgentKey::Agent2),
        Some(other) => Err(format!("unknown panel `{other}`, use 1 or 2")),
        None => Err("missing panel number".into()),
    }
}

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Nothing);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Broadcast(line.to_string()));
    };
    let (word, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let args = args.trim();
    match word {
        "1" | "2" if args.is_empty() => Err("nothing to send".into()),
        "1" | "2" => Ok(Command::Send(agent_arg(Some(word))?, args.to_string())),
        "clear" if args.is_empty() => Ok(Command::Clear(None)),
        "clear" => Ok(Command::Clear(Some(agent_arg(Some(args))?))),
        "thread" => {
            let (panel, id) = args.split_once(char::is_whitespace).ok_or("usage: /thread <1|2> <id>")?;
            Ok(Command::Thread(agent_arg(Some(panel))?, id.trim().to_string()))
        }
        "max" => {
            let (panel, n) = args.split_once(char::is_whitespace).ok_or("usage: /max <1|2> <n>")?;
            let n = n.trim().parse().map_err(|_| format!("`{}` is not a number", n.trim()))?;
            Ok(Command::Max(agent_arg(Some(panel))?, n))
        }
        "status" => Ok(Command::Status),
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command `/{other}`, try /help")),
    }
}

fn render_message(agent_name: &str, message: &Message) -> String {
    let who = match message.role {
        Role::User => "you",
        Role::Assistant => agent_name,
    };
    format!("{} {who}: {}", message.timestamp.with_timezone(&Local).format("%H:%M:%S"), message.content)
}

fn render_header<A: AgentApi>(panel: &ConversationPanel<A>) -> String {
    let config = panel.config();
    let conversation = if config.has_conversation() { config.conversation_id.as_str() } else { "unconfigured" };
    format!("[{} {} {}]", config.agent_name, panel.counter(), conversation)
}

fn print_outcome<A: AgentApi>(panel: &ConversationPanel<A>, outcome: &Result<Message, PanelError>) {
    let header = render_header(panel);
    match outcome {
        Ok(reply) => println!("{header} {}", render_message(&panel.config().agent_name, reply)),
        Err(err) => println!("{header} error: {err}"),
    }
}

fn print_report<A: AgentApi>(dashboard: &Dashboard<A>, report: &BroadcastReport) {
    if report.dispatched() == 0 {
        println!("no configured agent to send to");
    }
    for (key, outcome) in &report.outcomes {
        print_outcome(dashboard.panel(*key), outcome);
    }
}

fn print_status<A: AgentApi>(dashboard: &Dashboard<A>) {
    for key in AgentKey::ALL {
        let panel = dashboard.panel(key);
        println!("{}", render_header(panel));
        for message in panel.messages() {
            println!("  {}", render_message(&panel.config().agent_name, message));
        }
        if let Some(error) = panel.error() {
            println!("  error: {error}");
        }
    }
}

pub fn build_dashboard<A, F>(defaults: &DashboardDefaults, threads: [Option<String>; 2], mut make_api: F) -> Dashboard<A>
where
    A: AgentApi,
    F: FnMut(AgentKey) -> A,
{
    let [thread1, thread2] = threads;
    let mut panel = |key: AgentKey, thread: Option<String>| {
        let config = ConversationConfig::new(defaults.name_for(key))
            .with_conversation_id(thread.unwrap_or_default())
            .with_max_messages(defaults.max_messages);
        ConversationPanel::new(make_api(key), config)
    };
    let first = panel(AgentKey::Agent1, thread1);
    let second = panel(AgentKey::Agent2, thread2);
    Dashboard::new(first, second)
}

/// Line-oriented rendition of the side-by-side page, driven from stdin.
pub async fn run<A: AgentApi>(mut dashboard: Dashboard<A>) -> anyhow::Result<()> {
    let ready = dashboard.initialize().await;
    println!("{ready} of 2 agents ready. /help for commands.");
    print_status(&dashboard);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        match command {
            Command::Nothing => {}
            Command::Broadcast(text) => {
                let report = dashboard.broadcast(&text).await;
                print_report(&dashboard, &report);
            }
            Command::Send(key, text) => {
                let outcome = dashboard.send_to(key, &text).await;
                print_outcome(dashboard.panel(key), &outcome);
            }
            Command::Clear(target) => {
                for key in target.map_or_else(|| AgentKey::ALL.to_vec(), |k| vec![k]) {
                    dashboard.panel_mut(key).clear_history();
                }
                print_status(&dashboard);
            }
            Command::Thread(key, id) => {
                let panel = dashboard.panel_mut(key);
                let config = panel.config().clone().with_conversation_id(id);
                panel.save_config(config);
                println!("{}", render_header(dashboard.panel(key)));
            }
            Command::Max(key, n) => {
                let panel = dashboard.panel_mut(key);
                let config = panel.config().clone().with_max_messages(n);
                panel.save_config(config);
                println!("{}", render_header(dashboard.panel(key)));
            }
            Command::Status => print_status(&dashboard),
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
    }
    Ok(())
}

//! A terminal front end for the tutor widget.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::time::Duration;

use cloudsec_tutor::core::pump::{PumpEvent, Stage};
use cloudsec_tutor::core::transcript::{Message, Role};
use cloudsec_tutor::{
    INPUT_PLACEHOLDER, LAUNCHER_LABEL, TITLE, TutorWidget, TutorWidgetBuilder,
};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let widget = TutorWidgetBuilder::from_env()
        .on_event(move |event| {
            event_tx.send(event).ok();
        })
        .build();

    if !widget.is_launcher_visible() {
        eprintln!("API_KEY environment variable is not set");
        return;
    }
    println!(
        "[{}] type /open to start, /close to hide, /quit to leave",
        LAUNCHER_LABEL.bright_yellow().bold()
    );

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    'outer: loop {
        if widget.is_open() {
            print!("{} ", INPUT_PLACEHOLDER.dimmed());
        }
        print!("> ");
        std::io::stdout().flush().unwrap();

        let Some(line) = read_line().await else {
            break;
        };
        match line.trim() {
            "/quit" => break,
            "/open" => {
                open_panel(&widget).await;
                continue;
            }
            "/close" => {
                widget.close();
                continue;
            }
            _ if !widget.is_open() => {
                println!("Type /open to ask the expert.");
                continue;
            }
            _ => {}
        }

        widget.submit(line.trim());
        // The snapshot is answered after the input, so an accepted input
        // shows up as a busy stage here.
        match widget.snapshot().await {
            Some(snapshot) if snapshot.stage.is_busy() => {}
            Some(_) => continue,
            None => break,
        }

        let mut progress_bar = None;
        // Index of the message being printed and how much of it is out.
        let mut current = None;
        let mut printed = 0;

        loop {
            if current.is_none() {
                progress_bar
                    .get_or_insert_with(|| {
                        let progress_bar = ProgressBar::new_spinner();
                        progress_bar.set_style(progress_style.clone());
                        progress_bar.set_message("🤔 Thinking...");
                        progress_bar
                    })
                    .inc(1);
            }

            let sleep = sleep(Duration::from_millis(100));
            let event = select! {
                event = event_rx.recv() => {
                    let Some(event) = event else {
                        break 'outer;
                    };
                    event
                },
                _ = sleep => {
                    continue;
                }
            };

            match event {
                PumpEvent::MessageAppended { index, message }
                | PumpEvent::MessageUpdated { index, message }
                    if message.role() == Role::Assistant =>
                {
                    if current != Some(index) {
                        if message.text().is_empty() {
                            continue;
                        }
                        if current.is_some() {
                            println!();
                        }
                        current = Some(index);
                        printed = 0;
                    }

                    if let Some(progress_bar) = progress_bar.take() {
                        progress_bar.finish_and_clear();
                    }
                    let text = message.text();
                    let delta = text.get(printed..).unwrap_or(text);
                    if printed == 0 {
                        print!("{}🤖 ", BAR_CHAR.bright_cyan());
                    }
                    print!("{}", delta.bright_white());
                    std::io::stdout().flush().unwrap();
                    printed = text.len();
                }
                PumpEvent::StageChanged(Stage::Idle) => {
                    if let Some(progress_bar) = progress_bar.take() {
                        progress_bar.finish_and_clear();
                    }
                    if current.is_some() {
                        println!();
                    }
                    break;
                }
                _ => {}
            }
        }
    }
}

async fn open_panel(widget: &TutorWidget) {
    if !widget.open().await {
        return;
    }
    println!("{}", TITLE.bright_yellow().bold());
    let Some(snapshot) = widget.snapshot().await else {
        return;
    };
    for message in &snapshot.transcript {
        print_message(message);
    }
}

fn print_message(message: &Message) {
    match message.role() {
        Role::User => {
            println!("{}🧑 {}", BAR_CHAR.bright_green(), message.text());
        }
        Role::Assistant => {
            println!(
                "{}🤖 {}",
                BAR_CHAR.bright_cyan(),
                message.text().bright_white()
            );
        }
    }
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}

use std::io::{self, IsTerminal, Read};
use std::sync::{Arc, Mutex};

use clap::Parser;
use dg_backend::DgdClient;
use dg_core::config::Config;
use dg_core::logging;
use dg_core::output::ReplyPrinter;
use dg_core::stream::{StreamController, StreamListener, StreamSnapshot, StreamState};
use dg_protocol::Message;

const EXIT_ERROR: i32 = 1;
const EXIT_CANCELLED: i32 = 130;

/// Stream a reply from the DGD chat backend.
#[derive(Debug, Parser)]
#[command(name = "dgchat", version)]
struct Args {
    /// Session to post the message to
    #[arg(short, long)]
    session: String,

    /// Perspective tag to apply (repeatable)
    #[arg(short = 'p', long = "perspective")]
    perspectives: Vec<String>,

    /// Backend base URL, overriding config and DGD_API_BASE
    #[arg(long)]
    base_url: Option<String>,

    /// Log at debug level unless DGCHAT_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,

    /// Message text; read from stdin when omitted
    message: Option<String>,
}

/// Holds the finished message once the stream task delivers it.
#[derive(Default)]
struct Completion {
    message: Mutex<Option<Message>>,
}

impl Completion {
    fn take(&self) -> Option<Message> {
        self.message
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

impl StreamListener for Completion {
    fn on_message_complete(&self, message: Message) {
        *self
            .message
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(message);
    }
}

fn read_message(arg: Option<String>) -> Option<String> {
    let text = match arg {
        Some(text) => text,
        None if !io::stdin().is_terminal() => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).ok()?;
            buf
        }
        None => return None,
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn main() {
    let args = Args::parse();
    logging::init(args.verbose);

    let Some(message) = read_message(args.message.clone()) else {
        eprintln!("error: no message given (pass MESSAGE or pipe it on stdin)");
        std::process::exit(EXIT_ERROR);
    };

    let config = Config::load_or_default();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create async runtime: {e}");
            std::process::exit(EXIT_ERROR);
        }
    };

    let code = runtime.block_on(run(args, config, message));
    std::process::exit(code);
}

async fn run(args: Args, config: Config, message: String) -> i32 {
    let mut client_config = config.client_config();
    if let Some(base_url) = args.base_url {
        client_config.base_url = base_url;
    }

    let client = match DgdClient::new(client_config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("error: failed to build HTTP client: {e}");
            return EXIT_ERROR;
        }
    };

    let completion = Arc::new(Completion::default());
    let mut controller = StreamController::new(client, completion.clone());
    let mut updates = controller.subscribe();
    let mut printer = ReplyPrinter::new(io::stdout(), io::stderr());

    let perspectives = (!args.perspectives.is_empty()).then_some(args.perspectives);
    if !controller.start(message, args.session, perspectives) {
        return EXIT_ERROR;
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome: Option<StreamSnapshot> = loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break None;
                }
                let snap = updates.borrow_and_update().clone();
                if snap.is_streaming() {
                    printer.update(&snap.content);
                    continue;
                }
                break Some(snap);
            }
            _ = &mut ctrl_c => {
                controller.cancel();
                break Some(controller.snapshot());
            }
        }
    };

    // The completion callback runs after the snapshot settles.
    controller.finished().await;

    let Some(snap) = outcome else {
        printer.error(&"stream state channel closed");
        return EXIT_ERROR;
    };

    match snap.last_outcome {
        Some(StreamState::Completed) => match completion.take() {
            Some(message) => {
                printer.finish(&message);
                0
            }
            None => {
                printer.error(&"completed without a message");
                EXIT_ERROR
            }
        },
        Some(StreamState::Cancelled) => {
            printer.cancelled();
            EXIT_CANCELLED
        }
        _ => {
            match &snap.error {
                Some(error) => printer.error(&**error),
                None => printer.error(&"stream ended unexpectedly"),
            }
            EXIT_ERROR
        }
    }
}

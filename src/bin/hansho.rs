use std::sync::Arc;

use clap::{command, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use hansho::{
    DispatchError, Event, EventDispatcher, FailureEvent, HandlerRegistry, HandlerResult, Handles,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug mode
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug)]
struct AllTestsPassed;
impl Event for AllTestsPassed {}

#[derive(Debug)]
struct PreconditionFailed {
    precondition: &'static str,
}
impl Event for PreconditionFailed {}
impl FailureEvent for PreconditionFailed {}

/// Globally resolved listener for green builds.
#[derive(Debug)]
struct BuildAuditor;

impl Handles<AllTestsPassed> for BuildAuditor {
    fn handle(&self, _event: &AllTestsPassed) -> HandlerResult {
        println!("auditor: recorded a green build");
        Ok(())
    }
}

fn run() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.register::<AllTestsPassed, _>(Arc::new(BuildAuditor));

    let dispatcher = EventDispatcher::builder().resolver(registry).build();

    let registration = dispatcher.register(|_: &AllTestsPassed| {
        println!("all tests passed!");
        Ok(())
    });

    let handled = dispatcher.raise(&AllTestsPassed);
    debug!("AllTestsPassed reached {} handler(s)", handled);

    let failure = PreconditionFailed {
        precondition: "database reachable",
    };
    match dispatcher.fail_with(&failure) {
        Ok(_) => println!("the failure event was handled"),
        Err(DispatchError::UnhandledFailure { event_type }) => {
            println!(
                "nobody handled {} (precondition: {})",
                event_type, failure.precondition
            );
        }
    }

    registration.release();
    dispatcher.clear_callbacks();

    // Only the resolved auditor is left listening.
    let handled = dispatcher.raise(&AllTestsPassed);
    debug!("after clear, AllTestsPassed reached {} handler(s)", handled);
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    run();
}

use crate::demo::{run_demo, run_issue_link, DemoArgs, IssueLinkArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use codekids::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Code Kids Registration",
    about = "Run and demonstrate the Code Kids registration service from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk one registration through submit, confirmation and verification
    Demo(DemoArgs),
    /// Print a signed verification link for an email address
    IssueLink(IssueLinkArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args).await,
        Command::IssueLink(args) => run_issue_link(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["codekids-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn demo_flags_parse() {
        let cli = Cli::try_parse_from(["codekids-api", "demo", "--fail-sms"]).expect("parses");
        match cli.command {
            Some(Command::Demo(args)) => {
                assert!(args.fail_sms);
                assert!(!args.fail_email);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn issue_link_requires_an_email() {
        assert!(Cli::try_parse_from(["codekids-api", "issue-link"]).is_err());
        let cli = Cli::try_parse_from(["codekids-api", "issue-link", "--email", "a@b.com"])
            .expect("parses");
        assert!(matches!(cli.command, Some(Command::IssueLink(_))));
    }
}

use crate::infra::InMemoryRegistrationBackend;
use clap::Args;
use codekids::config::{AppConfig, RegistrationConfig};
use codekids::error::AppError;
use codekids::workflows::registration::{
    validate, FeedbackLog, NotificationChannel, RegistrationForm, RegistrationService,
    SubmissionError, VerificationTokens,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Simulate the email provider being down.
    #[arg(long)]
    pub(crate) fail_email: bool,
    /// Simulate the SMS provider being down.
    #[arg(long)]
    pub(crate) fail_sms: bool,
    /// How long the confirmation stays up before the form resets (milliseconds).
    #[arg(long, default_value_t = 3000)]
    pub(crate) success_display_ms: u64,
}

#[derive(Args, Debug)]
pub(crate) struct IssueLinkArgs {
    /// Email address the link verifies
    #[arg(long)]
    pub(crate) email: String,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let mut backend = InMemoryRegistrationBackend::default();
    if args.fail_email {
        backend = backend.with_offline_channel(NotificationChannel::Email);
    }
    if args.fail_sms {
        backend = backend.with_offline_channel(NotificationChannel::Sms);
    }
    let backend = Arc::new(backend);

    let config = RegistrationConfig {
        success_display: Duration::from_millis(args.success_display_ms),
        ..RegistrationConfig::default()
    };
    let service = RegistrationService::new(backend.clone(), config);

    println!("Code Kids registration demo");

    let mut incomplete = demo_form();
    incomplete.child_first_name = "A".to_string();
    incomplete.email = "parent-at-example".to_string();
    println!("\nValidation");
    match validate(&incomplete) {
        Ok(_) => println!("  Incomplete form unexpectedly passed validation"),
        Err(errors) => {
            for field in errors.fields() {
                for message in errors.get(field).unwrap_or_default() {
                    println!("  {field}: {message}");
                }
            }
        }
    }

    let registration = validate(&demo_form())?;

    let feedback = FeedbackLog::default();
    let orchestrator = service.orchestrator(Arc::new(feedback.clone()));

    println!("\nSubmission");
    println!("  State: {:?}", orchestrator.state());
    match orchestrator.submit(registration).await {
        Ok(receipt) => {
            println!("  State: {:?}", receipt.state);
            for outcome in &receipt.notifications {
                match &outcome.error {
                    None => println!("  {} confirmation: delivered", outcome.channel),
                    Some(error) => println!("  {} confirmation: failed ({error})", outcome.channel),
                }
            }
        }
        Err(SubmissionError::Persistence { message, .. }) => {
            println!("  State: {:?}", orchestrator.state());
            println!("  Error: {message}");
        }
        Err(err) => return Err(err.into()),
    }

    println!("  Feedback:");
    for event in feedback.events() {
        println!("    [{:?}] {}", event.level, event.message);
    }

    for stored in backend.registrations() {
        println!(
            "  Stored {} for {} ({})",
            stored.id.0,
            stored.row.email,
            stored.status.label()
        );
    }

    println!("\nVerification");
    let token = service.tokens().issue(&demo_form().email)?;
    let verify_feedback = FeedbackLog::default();
    let verifier = service.verifier(Arc::new(verify_feedback.clone()));
    let first = verifier.verify_token(Some(&token)).await;
    println!("  First use: {}", first.message());
    let replay = verifier.verify_token(Some(&token)).await;
    println!("  Replay: {}", replay.message());
    for stored in backend.registrations() {
        println!("  {} is now {}", stored.id.0, stored.status.label());
    }

    println!("\nReset");
    tokio::time::sleep(service.config().success_display + Duration::from_millis(50)).await;
    let snapshot = orchestrator.snapshot();
    println!(
        "  After {}ms: {:?} (form blank: {})",
        args.success_display_ms,
        snapshot.state,
        snapshot.draft == RegistrationForm::default()
    );

    Ok(())
}

pub(crate) fn run_issue_link(args: IssueLinkArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    if std::env::var("APP_VERIFICATION_SECRET").is_err() {
        eprintln!(
            "warning: APP_VERIFICATION_SECRET is not set; this link only verifies against this process"
        );
    }

    let tokens = VerificationTokens::from_config(&config.registration.verification);
    println!("{}", tokens.link_for(&args.email)?);
    Ok(())
}

fn demo_form() -> RegistrationForm {
    RegistrationForm {
        child_first_name: "Ada".to_string(),
        child_last_name: "Lovelace".to_string(),
        child_age: "9".to_string(),
        parent_name: "Anne Byron".to_string(),
        email: "anne@example.com".to_string(),
        phone: "5155550100".to_string(),
        skill_level: Some("beginner".to_string()),
        additional_info: Some("Enjoys logic puzzles".to_string()),
    }
}

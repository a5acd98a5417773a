use anyhow::Result;
use clap::Parser;
use tracing::Instrument;
use uuid::Uuid;

mod cli;
mod config;
mod errors;
mod form;
mod log;
mod prompt;
mod provider;
mod ux;
mod wire;
mod wizard;

use provider::FortuneService;
use wire::FortuneMethod;
use wizard::{Outcome, WizardController};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    log::init(args.verbose, args.debug);

    let cfg = config::Config::load(&args)?;
    let service = provider::make_service(&cfg)?;

    let session_id = Uuid::new_v4();
    let span = tracing::info_span!("session", id = %session_id, provider = ?cfg.provider);
    run(&args, &cfg, service.as_ref()).instrument(span).await
}

async fn run(args: &cli::Args, cfg: &config::Config, service: &dyn FortuneService) -> Result<()> {
    ux::banner();
    let mut wiz = WizardController::new();
    let mut wish_arg = args.wish.clone();
    let mut prefill = args.fields.clone();

    loop {
        // ===== STEP 1: WISH =====
        loop {
            let wish = match wish_arg.take() {
                Some(w) => w,
                None => match ux::ask_wish()? {
                    Some(w) => w,
                    None => return Ok(()),
                },
            };
            wiz.set_wish(wish);

            let mut progress = ux::Progress::new(cfg.progress, "selecting an analysis engine...");
            match wiz.submit_wish(service, |s| progress.observe(s)).await {
                Outcome::Advanced => break,
                Outcome::Failed => ux::show_error(wiz.session().error().unwrap_or(wizard::METHOD_FALLBACK_ERROR)),
                Outcome::Ignored => ux::show_hint("The oracle needs a wish to sync with."),
            }
        }

        let Some(method) = wiz.session().method().cloned() else {
            continue;
        };
        if args.debug {
            log::print_method_debug(&method)?;
        }

        // ===== STEP 2: INFO GATHERING =====
        ux::show_method(&method);
        if !fill_form(&mut wiz, &method, &mut prefill)? {
            return Ok(());
        }

        // ===== STEP 3: RESULT =====
        ux::show_report_header(&method, wiz.session().wish());
        let mut view = ux::ReportView::new(cfg.progress);
        wiz.submit_info(service, |s| view.observe(s)).await;
        view.finish();
        if let Some(err) = wiz.session().error() {
            ux::show_error(err);
        }

        if !ux::confirm("Reset the link and decode a new dimension?") {
            return Ok(());
        }
        wiz.reset();
    }
}

/// Collects a value for every field, from `--field` prefills first and then
/// interactively. Returns false when input ends before the form is complete.
fn fill_form(
    wiz: &mut WizardController,
    method: &FortuneMethod,
    prefill: &mut Vec<(String, String)>,
) -> Result<bool> {
    let mut asked: Vec<&str> = Vec::new();
    for field in &method.required_fields {
        if asked.contains(&field.name.as_str()) {
            continue;
        }
        asked.push(&field.name);

        let current = wiz.session().user_info().get(&field.name).unwrap_or_default().to_string();
        let widget = form::render(field, &current);

        if let Some(pos) = prefill.iter().position(|(name, _)| name == &field.name) {
            let (_, value) = prefill.remove(pos);
            match widget.change(&value) {
                Ok(change) => {
                    wiz.apply_change(change);
                    continue;
                }
                Err(e) => ux::show_error(&format!("--field {}: {}", field.name, e)),
            }
        }

        loop {
            let Some(raw) = ux::ask_field(&widget)? else {
                return Ok(false);
            };
            match widget.change(&raw) {
                Ok(change) => {
                    wiz.apply_change(change);
                    break;
                }
                Err(e) => ux::show_error(&e.to_string()),
            }
        }
    }

    for (name, _) in prefill.drain(..) {
        tracing::warn!(field = %name, "ignoring --field not used by {}", method.name);
    }
    let missing = form::missing_fields(method, wiz.session().user_info());
    if !missing.is_empty() {
        tracing::warn!(?missing, "submitting with empty fields");
    }
    Ok(true)
}

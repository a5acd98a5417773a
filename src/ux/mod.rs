use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::time::Duration;

use crate::form::Widget;
use crate::wire::FortuneMethod;
use crate::wizard::{Session, WizardStep};

/// Reads one line from stdin. `None` on end of input.
fn read_line(prompt: &str) -> io::Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut s = String::new();
    if io::stdin().lock().read_line(&mut s)? == 0 {
        return Ok(None);
    }
    Ok(Some(s.trim_end_matches(['\r', '\n']).to_string()))
}

pub fn banner() {
    println!("\n{}", "┏━━━━━━━━━━━━━━━━━━━━ ORACLE NEXUS ━━━━━━━━━━━━━━━━━━━━┓".cyan().bold());
    println!("  {}", "Quantum divination terminal // consciousness sync ready".dimmed());
    println!("{}", "┗━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━┛".cyan().bold());
}

pub fn ask_wish() -> io::Result<Option<String>> {
    println!("\n{}", "What do you want the oracle to analyse?".bold());
    println!("{}", "e.g. decode my career potential, find my next emotional peak...".dimmed());
    read_line("> ")
}

pub fn show_method(method: &FortuneMethod) {
    println!("\n{} {}", "Analysis mode:".cyan().bold(), method.name.bold());
    if !method.description.trim().is_empty() {
        println!("{}", method.description.dimmed());
    }
    if !method.required_fields.is_empty() {
        println!("\n{}", "Sync your parameters:".bold());
    }
}

/// Asks for one field. Returns the raw text for [`Widget::change`].
pub fn ask_field(widget: &Widget) -> io::Result<Option<String>> {
    if !widget.value().is_empty() {
        println!("{}", format!("current: {}", widget.value()).dimmed());
    }
    match widget {
        Widget::Select { label, prompt, options, .. } => {
            println!("{} {}", label.bold(), format!("({})", prompt).dimmed());
            for (i, opt) in options.iter().enumerate() {
                println!("  {}. {}", i + 1, opt);
            }
            Ok(read_line("  number or value (empty to skip): ")?.map(|raw| select_input(options, &raw)))
        }
        Widget::DateTime { label, .. } => read_line(&format!("{} {}: ", label.bold(), "[YYYY-MM-DDTHH:MM]".dimmed())),
        Widget::Text { label, placeholder, .. } => read_line(&format!("{} {}: ", label.bold(), format!("({})", placeholder).dimmed())),
    }
}

/// Maps a 1-based option number to the option; anything else passes through.
fn select_input(options: &[String], raw: &str) -> String {
    let raw = raw.trim();
    match raw.parse::<usize>() {
        Ok(n) if n >= 1 && n <= options.len() => options[n - 1].clone(),
        _ => raw.to_string(),
    }
}

pub fn show_error(msg: &str) {
    eprintln!("{} {}", "✖".red().bold(), msg.red());
}

pub fn show_hint(msg: &str) {
    println!("{}", msg.yellow());
}

pub fn confirm(prompt: &str) -> bool {
    match read_line(&format!("\n{} [y/N]: ", prompt)) {
        Ok(Some(ans)) => {
            let ans = ans.trim().to_lowercase();
            ans == "y" || ans == "yes"
        }
        _ => false,
    }
}

/// Spinner shown while a call is in flight and nothing has been printed.
pub struct Progress {
    enabled: bool,
    message: &'static str,
    bar: Option<ProgressBar>,
}

impl Progress {
    pub fn new(enabled: bool, message: &'static str) -> Self {
        Self { enabled, message, bar: None }
    }

    pub fn observe(&mut self, s: &Session) {
        // Report text from an earlier run lingers until the next report starts.
        let waiting = s.is_loading() && (s.step() != WizardStep::Result || s.result_text().is_empty());
        if waiting && self.bar.is_none() && self.enabled {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
                bar.set_style(style);
            }
            bar.set_message(self.message);
            bar.enable_steady_tick(Duration::from_millis(100));
            self.bar = Some(bar);
        } else if !waiting {
            self.stop();
        }
    }

    fn stop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Prints report text as it grows.
pub struct ReportView {
    progress: Progress,
    printed: usize,
}

impl ReportView {
    pub fn new(progress: bool) -> Self {
        Self { progress: Progress::new(progress, "decoding fate data..."), printed: 0 }
    }

    pub fn observe(&mut self, s: &Session) {
        self.progress.observe(s);
        let text = s.result_text();
        if let Some(new) = text.get(self.printed..).filter(|t| !t.is_empty()) {
            print!("{}", new);
            io::stdout().flush().ok();
            self.printed = text.len();
        }
    }

    pub fn finish(mut self) {
        self.progress.stop();
        if self.printed > 0 {
            println!();
        }
        println!("\n{}", "── Oracle Nexus v2.0 // System Stable ──".dimmed());
    }
}

pub fn show_report_header(method: &FortuneMethod, wish: &str) {
    println!("\n{} {}", "▶ Fate decode report:".magenta().bold(), method.name.bold());
    println!("{}\n", format!("wish: {}", wish.trim()).dimmed());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form;
    use crate::provider::testing::{Report, Scripted};
    use crate::wire::{FieldKind, RequiredField};
    use crate::wizard::WizardController;

    fn tarot() -> FortuneMethod {
        FortuneMethod {
            name: "Tarot Matrix".into(),
            description: String::new(),
            required_fields: vec![RequiredField {
                name: "question".into(),
                label: "Question".into(),
                kind: FieldKind::FreeText,
                placeholder: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_spinner_shows_on_every_run() {
        let service = Scripted::new(Ok(tarot()), Report::Chunks(vec!["old report"], None));
        let mut wiz = WizardController::new();

        for wish in ["career clarity", "love"] {
            assert!(wiz.set_wish(wish));
            let mut progress = Progress::new(true, "selecting");
            let mut spinning = Vec::new();
            wiz.submit_wish(&service, |s| {
                progress.observe(s);
                spinning.push(progress.bar.is_some());
            })
            .await;
            assert_eq!(spinning, vec![true, false], "wish {:?}", wish);

            let widget = form::render(&tarot().required_fields[0], "");
            assert!(wiz.apply_change(widget.change("will it work out?").unwrap()));
            let mut report = Progress::new(true, "decoding");
            let mut spinning = Vec::new();
            wiz.submit_info(&service, |s| {
                report.observe(s);
                spinning.push(report.bar.is_some());
            })
            .await;
            assert_eq!(spinning, vec![true, false, false]);
            assert!(wiz.reset());
        }
    }

    #[tokio::test]
    async fn test_disabled_progress_never_spins() {
        let service = Scripted::new(Ok(tarot()), Report::Chunks(vec![], None));
        let mut progress = Progress::new(false, "selecting");
        let mut wiz = WizardController::new();
        wiz.set_wish("career clarity");
        wiz.submit_wish(&service, |s| {
            progress.observe(s);
            assert!(progress.bar.is_none());
        })
        .await;
    }

    #[test]
    fn test_select_input_maps_numbers() {
        let options = vec!["Fire".to_string(), "Water".to_string()];
        assert_eq!(select_input(&options, "2"), "Water");
        assert_eq!(select_input(&options, " 1 "), "Fire");
        assert_eq!(select_input(&options, "3"), "3");
        assert_eq!(select_input(&options, "0"), "0");
        assert_eq!(select_input(&options, "Water"), "Water");
        assert_eq!(select_input(&options, ""), "");
    }
}

//! Line-oriented converter screen

use super::ui::{self, StyleType};
use crate::core::clock::Clock;
use crate::core::converter::{Converter, ConverterState, FieldChange, RateStatus};
use crate::core::rates::BASE_CURRENCY;
use crate::core::source::RateSource;
use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use comfy_table::Cell;
use std::io::Write;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const HELP: &str = "\
Commands:
  date YYYY-MM-DD | DD.MM.YYYY | today   select the rates date
  from CODE                              source currency
  to CODE                                target currency
  amount TEXT                            edit the source amount
  target TEXT                            edit the target amount
  swap                                   exchange source and target currencies
  list                                   currencies of the loaded rates
  show                                   current conversion
  help                                   this text
  quit                                   leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateArg {
    Today,
    On(NaiveDate),
}

impl FromStr for DateArg {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("today") {
            return Ok(DateArg::Today);
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(s, "%d.%m.%Y"))
            .map(DateArg::On)
            .map_err(|_| anyhow!("Invalid date: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Date(DateArg),
    From(String),
    To(String),
    Amount(String),
    Target(String),
    Swap,
    List,
    Show,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(word, rest)| (word, rest.trim()));
        let required = |name: &str| {
            if rest.is_empty() {
                Err(anyhow!("Usage: {} <value>", name))
            } else {
                Ok(rest.to_string())
            }
        };

        match word.to_lowercase().as_str() {
            "date" => Ok(Command::Date(required("date")?.parse()?)),
            "from" => Ok(Command::From(required("from")?)),
            "to" => Ok(Command::To(required("to")?)),
            "amount" => Ok(Command::Amount(rest.to_string())),
            "target" => Ok(Command::Target(rest.to_string())),
            "swap" => Ok(Command::Swap),
            "list" => Ok(Command::List),
            "show" => Ok(Command::Show),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(anyhow!("Unknown command: {}. Type 'help'.", other)),
        }
    }
}

fn describe(change: &FieldChange) -> String {
    let label = |text: &str| ui::style_text(text, StyleType::Label);
    let value = |text: &str| ui::style_text(text, StyleType::Value);
    match change {
        FieldChange::SelectedDate(date) => {
            format!("{} {}", label("Date:"), date.format("%d.%m.%Y"))
        }
        FieldChange::SourceCurrency(code) => {
            format!("{} {}", label("From:"), code.as_deref().unwrap_or("-"))
        }
        FieldChange::TargetCurrency(code) => {
            format!("{} {}", label("To:"), code.as_deref().unwrap_or("-"))
        }
        FieldChange::SourceAmount(text) => format!("{} {}", label("Amount:"), value(text)),
        FieldChange::TargetAmount(text) => format!("{} {}", label("Target:"), value(text)),
        FieldChange::Currencies(codes) => ui::style_text(
            &format!("{} currencies available", codes.len()),
            StyleType::Subtle,
        ),
        FieldChange::Status(RateStatus::Unavailable) => ui::style_text(
            &RateStatus::Unavailable.to_string(),
            StyleType::Error,
        ),
        FieldChange::Status(status) => format!("{} {}", label("Rates:"), status),
    }
}

fn render_state(state: &ConverterState) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell(""),
        ui::header_cell("Currency"),
        ui::header_cell("Amount"),
    ]);
    table.add_row(vec![
        Cell::new("From"),
        Cell::new(state.source_currency().unwrap_or("-")),
        ui::number_cell(Some(state.source_amount())),
    ]);
    table.add_row(vec![
        Cell::new("To"),
        Cell::new(state.target_currency().unwrap_or("-")),
        ui::number_cell(Some(state.target_amount()).filter(|t| !t.is_empty())),
    ]);

    let mut rendered = format!(
        "{} {}\n{} {}\n{table}",
        ui::style_text("Date:", StyleType::Label),
        state.selected_date().format("%d.%m.%Y"),
        ui::style_text("Rates:", StyleType::Label),
        state.status(),
    );
    if let Some(rate) = state
        .source_currency()
        .and_then(|code| state.rates().lookup(code))
    {
        rendered.push_str(&format!(
            "\n{} {} {} = {} {}",
            ui::style_text("Rate:", StyleType::Label),
            rate.nominal,
            rate.code,
            rate.value,
            BASE_CURRENCY
        ));
    }
    rendered
}

fn render_rates(state: &ConverterState) -> String {
    let Some(mapping) = state.rates().mapping() else {
        return ui::style_text("No rates loaded yet", StyleType::Subtle);
    };

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Code"),
        ui::header_cell("Name"),
        ui::header_cell("Nominal"),
        ui::header_cell("Value"),
    ]);
    for rate in mapping.rates() {
        table.add_row(vec![
            Cell::new(&rate.code),
            Cell::new(&rate.name),
            ui::number_cell(Some(&rate.nominal.to_string())),
            ui::number_cell(Some(&rate.value.to_string())),
        ]);
    }

    format!(
        "{}\n{table}",
        ui::style_text(
            &format!("Rates as of {}", mapping.date().format("%d.%m.%Y")),
            StyleType::Title
        )
    )
}

/// Interactive converter bound to one output.
///
/// Every field change is echoed as it happens; date changes reload rates in
/// the background while further commands are accepted.
pub struct Screen<S: RateSource + 'static, W: Write + Send + 'static> {
    converter: Arc<Converter<S>>,
    clock: Arc<dyn Clock>,
    out: Arc<Mutex<W>>,
    reloads: Vec<JoinHandle<()>>,
}

impl<S: RateSource + 'static, W: Write + Send + 'static> Screen<S, W> {
    pub fn new(converter: Arc<Converter<S>>, clock: Arc<dyn Clock>, out: W) -> Self {
        let out = Arc::new(Mutex::new(out));
        let sink = Arc::clone(&out);
        converter.with_state(|state| {
            state.subscribe(Box::new(move |change: &FieldChange| {
                let mut out = sink.lock().unwrap_or_else(PoisonError::into_inner);
                if let Err(e) = writeln!(out, "{}", describe(change)) {
                    warn!(error = %e, "Failed to write field change");
                }
            }))
        });

        Self {
            converter,
            clock,
            out,
            reloads: Vec::new(),
        }
    }

    fn print(&self, text: &str) -> Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{text}")?;
        out.flush()?;
        Ok(())
    }

    fn prompt(&self) -> Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        write!(out, "> ")?;
        out.flush()?;
        Ok(())
    }

    fn spawn_reload(&mut self) {
        let converter = Arc::clone(&self.converter);
        let handle = tokio::spawn(async move {
            let date = converter.with_state(|state| state.selected_date());
            let pb = ui::spinner(format!("Loading rates for {}", date.format("%d.%m.%Y")));
            let result = converter.reload().await;
            pb.finish_and_clear();
            if let Err(e) = result {
                debug!("Reload finished without rates: {}", e);
            }
        });
        self.reloads.retain(|reload| !reload.is_finished());
        self.reloads.push(handle);
    }

    /// Waits for every reload still in flight.
    pub async fn settle(&mut self) {
        for reload in self.reloads.drain(..) {
            if let Err(e) = reload.await {
                warn!(error = %e, "Rate reload task failed");
            }
        }
    }

    fn execute(&mut self, command: Command) -> Result<bool> {
        match command {
            Command::Date(arg) => {
                let date = match arg {
                    DateArg::Today => self.clock.today(),
                    DateArg::On(date) => date,
                };
                if self
                    .converter
                    .with_state(|state| state.set_selected_date(date))
                {
                    self.spawn_reload();
                }
            }
            Command::From(code) => self
                .converter
                .with_state(|state| state.set_source_currency(&code)),
            Command::To(code) => self
                .converter
                .with_state(|state| state.set_target_currency(&code)),
            Command::Amount(text) => self
                .converter
                .with_state(|state| state.set_source_amount(&text)),
            Command::Target(text) => self
                .converter
                .with_state(|state| state.set_target_amount(&text)),
            Command::Swap => self.converter.with_state(|state| state.swap_currencies()),
            Command::List => {
                let rendered = self.converter.with_state(|state| render_rates(state));
                self.print(&rendered)?;
            }
            Command::Show => {
                let rendered = self.converter.with_state(|state| render_state(state));
                self.print(&rendered)?;
            }
            Command::Help => self.print(HELP)?,
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    /// Loads rates for the restored date, then processes commands until
    /// `quit` or end of input. Pending reloads finish before returning.
    pub async fn run<R: AsyncBufRead + Unpin>(mut self, input: R) -> Result<()> {
        self.print(&ui::style_text("Currency converter", StyleType::Title))?;
        self.spawn_reload();

        let mut lines = input.lines();
        loop {
            self.prompt()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(command) => {
                    if !self.execute(command)? {
                        break;
                    }
                }
                Err(e) => self.print(&ui::style_text(&e.to_string(), StyleType::Error))?,
            }
        }

        self.settle().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::preferences::Preferences;
    use crate::core::rates::{CurrencyRate, RateMapping};
    use crate::core::resolver::Resolution;
    use rust_decimal::Decimal;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            "date 2024-02-29".parse::<Command>().unwrap(),
            Command::Date(DateArg::On(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()))
        );
        assert_eq!(
            "date 29.02.2024".parse::<Command>().unwrap(),
            Command::Date(DateArg::On(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()))
        );
        assert_eq!(
            "DATE today".parse::<Command>().unwrap(),
            Command::Date(DateArg::Today)
        );
        assert_eq!(
            "from  jpy ".parse::<Command>().unwrap(),
            Command::From("jpy".to_string())
        );
        assert_eq!(
            "amount 12,5".parse::<Command>().unwrap(),
            Command::Amount("12,5".to_string())
        );
        assert_eq!(
            "amount".parse::<Command>().unwrap(),
            Command::Amount(String::new())
        );
        assert_eq!("q".parse::<Command>().unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_command_errors() {
        assert!(
            "date 2024-13-01"
                .parse::<Command>()
                .unwrap_err()
                .to_string()
                .contains("Invalid date")
        );
        assert!(
            "from"
                .parse::<Command>()
                .unwrap_err()
                .to_string()
                .contains("Usage: from")
        );
        assert!(
            "convert 10"
                .parse::<Command>()
                .unwrap_err()
                .to_string()
                .contains("Unknown command")
        );
    }

    #[test]
    fn test_show_includes_source_rate() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut prefs = Preferences::defaults(date);
        prefs.source_currency = "JPY".to_string();
        let mut state = ConverterState::from_preferences(prefs);

        assert!(!render_state(&state).contains("Rate:"));

        let jpy = CurrencyRate::new("JPY", "Японских иен", Decimal::from(60), Decimal::from(100))
            .unwrap();
        state.apply_resolution(Ok(Resolution {
            mapping: Arc::new(RateMapping::new(date, vec![jpy])),
            effective_date: date,
        }));

        let rendered = render_state(&state);
        assert!(rendered.contains("100 JPY = 60 RUB"));
        assert!(rendered.contains("01.03.2024"));
    }

    #[test]
    fn test_describe_changes() {
        assert!(describe(&FieldChange::TargetAmount("9.00".to_string())).contains("9.00"));
        assert!(describe(&FieldChange::SourceCurrency(None)).contains('-'));
        assert!(
            describe(&FieldChange::Status(RateStatus::Unavailable))
                .contains("Rates unavailable for the selected range")
        );
    }
}

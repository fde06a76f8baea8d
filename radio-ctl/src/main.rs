//! Radio Link Control Tool
//!
//! Detects radio interfaces and serial modems, configures SiK frequency
//! plans and TX power, and computes controller link assignments.

mod settings;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use radio_core::power::raw_to_mw;
use radio_core::RadioInterfaceRecord;
use radio_detect::{
    IwPowerControl, PlanOutcome, PowerFamily, RadioContext, SerialContext, SerialPortOpener, SikEngine,
    SystemProbe, TxPowerConfig, TxPowerManager,
};
use radio_links::{
    apply_plan, assign_dual, assign_first_pairing, assign_search, assign_single, AssignmentOptions,
    ControllerPreferences, LinkAssignmentPlan, LinkRequest,
};
use settings::Settings;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "radioctl", version, about = "Radio link hardware detection and configuration")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Detect all radio interfaces from scratch and save them
    Enumerate,
    /// Show the radio interfaces, detecting them if nothing is saved
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show serial ports and their roles
    Serial,
    /// Move a SiK modem to a new frequency with default plan settings
    SikFreq { index: usize, khz: u32 },
    /// Set the transmit power of a SiK modem in dBm
    SikPower { index: usize, dbm: u32 },
    /// Change the serial speed of a SiK modem
    SikSpeed { index: usize, baud: u32 },
    /// Raw TX power of a Wi-Fi driver family
    TxPower {
        #[command(subcommand)]
        cmd: TxPowerCmd,
    },
    /// Compute which interfaces receive and transmit
    Assign {
        /// Vehicle link frequency in kHz
        #[arg(long, conflicts_with = "search")]
        freq: Option<u32>,
        /// Second vehicle link frequency in kHz
        #[arg(long, requires = "freq")]
        freq2: Option<u32>,
        /// Listen on a frequency without transmitting
        #[arg(long)]
        search: Option<u32>,
        /// Tune and open the interfaces as assigned
        #[arg(long)]
        apply: bool,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
enum TxPowerCmd {
    Get {
        #[arg(value_parser = parse_family)]
        family: PowerFamily,
    },
    Set {
        #[arg(value_parser = parse_family)]
        family: PowerFamily,
        #[arg(allow_negative_numbers = true)]
        raw: i32,
    },
}

fn parse_family(s: &str) -> Result<PowerFamily, String> {
    PowerFamily::ALL
        .iter()
        .copied()
        .find(|f| f.module().eq_ignore_ascii_case(s))
        .ok_or_else(|| {
            let known: Vec<&str> = PowerFamily::ALL.iter().map(|f| f.module()).collect();
            format!("unknown driver family '{}', expected one of {}", s, known.join(", "))
        })
}

/// Registries and engine shared by the subcommands
struct Radios {
    probe: SystemProbe,
    serial: SerialContext,
    radios: RadioContext,
    sik: SikEngine<SerialPortOpener>,
}

impl Radios {
    fn new(settings: Settings) -> Self {
        let paths = settings.paths();
        let probe = SystemProbe::new();
        let mut serial = SerialContext::new(paths.clone());
        serial.init(&probe);
        let sik = SikEngine::with_config(SerialPortOpener, settings.sik_config());
        Self {
            probe,
            serial,
            radios: RadioContext::new(paths),
            sik,
        }
    }

    async fn init(&mut self) -> Result<()> {
        self.radios
            .init(&self.probe, &mut self.serial, &self.sik)
            .await
            .context("Failed to initialize radio interfaces")
    }
}

fn print_record(index: usize, r: &RadioInterfaceRecord) {
    let state = if !r.supported {
        "unsupported"
    } else if r.last_freq_set_failed {
        "freq failed"
    } else {
        "ok"
    };
    println!(
        "{:>2}  {:<10} {:<20} {:<22} {:<14} {:>8} kHz  bands {}  [{}]",
        index,
        r.name,
        r.mac,
        r.card_model.name(),
        r.driver.name(),
        r.current_freq_khz,
        r.supported_bands,
        state
    );
}

fn print_plan(plan: &LinkAssignmentPlan, radios: &RadioContext, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(plan)?);
        return Ok(());
    }
    for a in &plan.interfaces {
        let name = radios.get(a.index).map(|r| r.name.as_str()).unwrap_or("?");
        let role = match (a.rx, a.tx) {
            (true, true) => "RX/TX",
            (true, false) => "RX",
            (false, true) => "TX",
            (false, false) => "idle",
        };
        println!("{:>2}  {:<10} {:>8} kHz  {}", a.index, name, a.freq_khz, role);
    }
    Ok(())
}

fn report_outcome(outcome: PlanOutcome) -> Result<()> {
    match outcome {
        PlanOutcome::Unchanged => println!("Already configured, nothing written"),
        PlanOutcome::Applied { written, failed } => {
            println!("Wrote {} register(s), {} failed", written, failed);
            if failed > 0 {
                bail!("{} register write(s) failed", failed);
            }
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load();

    match cli.cmd {
        Command::Enumerate => {
            let mut ctx = Radios::new(settings);
            ctx.radios
                .enumerate(&ctx.probe, &mut ctx.serial, &ctx.sik)
                .await
                .context("Radio enumeration failed")?;
            for (i, r) in ctx.radios.records().iter().enumerate() {
                print_record(i, r);
            }
        }
        Command::List { json } => {
            let mut ctx = Radios::new(settings);
            ctx.init().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(ctx.radios.records())?);
            } else {
                for (i, r) in ctx.radios.records().iter().enumerate() {
                    print_record(i, r);
                }
            }
        }
        Command::Serial => {
            let ctx = Radios::new(settings);
            for (i, p) in ctx.serial.ports().iter().enumerate() {
                println!(
                    "{:>2}  {:<14} {:<20} {:>7}  {:<14} {}",
                    i,
                    p.name,
                    p.path,
                    p.baud,
                    p.usage,
                    if p.supported { "" } else { "(unsupported)" }
                );
            }
        }
        Command::SikFreq { index, khz } => {
            let mut ctx = Radios::new(settings);
            ctx.init().await?;
            let outcome = ctx
                .sik
                .set_frequency(&mut ctx.radios, &ctx.serial, index, khz)
                .await
                .with_context(|| format!("Failed to set SiK radio {} to {} kHz", index, khz))?;
            report_outcome(outcome)?;
        }
        Command::SikPower { index, dbm } => {
            let mut ctx = Radios::new(settings);
            ctx.init().await?;
            let outcome = ctx
                .sik
                .set_tx_power(&mut ctx.radios, &ctx.serial, index, dbm)
                .await
                .with_context(|| format!("Failed to set SiK radio {} power", index))?;
            report_outcome(outcome)?;
        }
        Command::SikSpeed { index, baud } => {
            let mut ctx = Radios::new(settings);
            ctx.init().await?;
            let outcome = ctx
                .sik
                .set_serial_speed(&mut ctx.radios, &mut ctx.serial, index, baud)
                .await
                .with_context(|| format!("Failed to set SiK radio {} serial speed", index))?;
            report_outcome(outcome)?;
        }
        Command::TxPower { cmd } => {
            let manager = TxPowerManager::with_control(TxPowerConfig::default(), IwPowerControl);
            match cmd {
                TxPowerCmd::Get { family } => {
                    let Some(raw) = manager.get_raw_power(family) else {
                        bail!("No valid TX power stored for {}", family.module());
                    };
                    println!("{} {}", family.module(), raw);
                    let mut radios = RadioContext::new(settings.paths());
                    if radios.load().is_ok() {
                        for r in radios.records().iter().filter(|r| family.drives(r)) {
                            println!("  {:<10} {} mW", r.name, raw_to_mw(r.driver, r.card_model, raw));
                        }
                    }
                }
                TxPowerCmd::Set { family, raw } => {
                    let mut ctx = Radios::new(settings);
                    if let Err(e) = ctx.radios.load() {
                        warn!("No saved radio interfaces, only updating the option file: {}", e);
                    }
                    let stored = manager
                        .set_raw_power(family, raw, &ctx.radios)
                        .with_context(|| format!("Failed to set TX power for {}", family.module()))?;
                    match stored {
                        Some(raw) => println!("{} {}", family.module(), raw),
                        None => bail!("TX power for {} did not read back", family.module()),
                    }
                }
            }
        }
        Command::Assign {
            freq,
            freq2,
            search,
            apply,
            json,
        } => {
            let options = AssignmentOptions {
                auto_tx: settings.auto_tx,
            };
            let mut ctx = Radios::new(settings);
            ctx.init().await?;
            let mut prefs = ControllerPreferences::from_paths(ctx.radios.paths());
            if let Err(e) = prefs.load() {
                warn!("Using default controller preferences: {}", e);
            }

            let records = ctx.radios.records();
            let plan = match (freq, freq2, search) {
                (Some(f1), Some(f2), _) => {
                    assign_dual(records, &prefs, [LinkRequest::new(f1), LinkRequest::new(f2)], options)
                }
                (Some(f), None, _) => assign_single(records, &prefs, LinkRequest::new(f), options),
                (None, _, Some(f)) => assign_search(records, &prefs, f),
                (None, _, None) => assign_first_pairing(records, &prefs),
            }
            .context("Link assignment failed")?;

            if apply {
                let applied = apply_plan(&mut ctx.radios, &plan);
                info!("Applied frequencies to {} interface(s)", applied);
                ctx.radios.save().context("Failed to save radio interfaces")?;
            }
            print_plan(&plan, &ctx.radios, json)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "radioctl=info,radio_core=info,radio_detect=info,radio_links=info,radio_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    run(Cli::parse()).await
}

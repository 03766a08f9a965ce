use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::Verbosity;
use symcalc::{calculate, AngleUnit, ComplexFormat, Preferences, SymbolStore};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
  #[command(flatten)]
  verbose: Verbosity,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Evaluate a calculator expression and print its exact and approximate
  /// values
  Eval {
    /// The expression to evaluate
    expression: String,

    #[arg(long, value_enum, default_value_t = FormatArg::Real)]
    complex_format: FormatArg,

    #[arg(long, value_enum, default_value_t = AngleArg::Radian)]
    angle_unit: AngleArg,

    /// Definitions evaluated first, as `name=expression` or
    /// `name(x)=expression`
    #[arg(long = "define", value_name = "DEFINITION")]
    definitions: Vec<String>,
  },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
  Real,
  Cartesian,
  Polar,
}

impl From<FormatArg> for ComplexFormat {
  fn from(format: FormatArg) -> Self {
    match format {
      FormatArg::Real => ComplexFormat::Real,
      FormatArg::Cartesian => ComplexFormat::Cartesian,
      FormatArg::Polar => ComplexFormat::Polar,
    }
  }
}

#[derive(Clone, Copy, ValueEnum)]
enum AngleArg {
  Radian,
  Degree,
  Gradian,
}

impl From<AngleArg> for AngleUnit {
  fn from(unit: AngleArg) -> Self {
    match unit {
      AngleArg::Radian => AngleUnit::Radian,
      AngleArg::Degree => AngleUnit::Degree,
      AngleArg::Gradian => AngleUnit::Gradian,
    }
  }
}

/// `a=2` reads as a comparison, so plain symbol definitions go through
/// `:=`; function definitions already parse as such.
fn definition_statement(definition: &str) -> Result<String> {
  let (name, body) = definition
    .split_once('=')
    .ok_or_else(|| anyhow!("expected name=expression, found {}", definition))?;
  if name.contains('(') {
    Ok(definition.to_string())
  } else {
    Ok(format!("{}:={}", name.trim(), body))
  }
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  simplelog::TermLogger::init(
    cli.verbose.log_level_filter(),
    simplelog::ConfigBuilder::new()
      .set_time_level(simplelog::LevelFilter::Off)
      .build(),
    simplelog::TerminalMode::Stderr,
    simplelog::ColorChoice::Auto,
  )?;

  match cli.command {
    Commands::Eval {
      expression,
      complex_format,
      angle_unit,
      definitions,
    } => {
      let preferences = Preferences {
        complex_format: complex_format.into(),
        angle_unit: angle_unit.into(),
        ..Preferences::default()
      };
      let mut store = SymbolStore::new();
      for definition in &definitions {
        let statement = definition_statement(definition)?;
        calculate(&statement, &preferences, &mut store)
          .with_context(|| format!("cannot define {}", definition))?;
      }
      let calculation = calculate(&expression, &preferences, &mut store)?;
      if calculation.exact == calculation.approximate {
        println!("{}", calculation.exact);
      } else {
        println!("{} = {}", calculation.exact, calculation.approximate);
      }
    }
  }
  Ok(())
}

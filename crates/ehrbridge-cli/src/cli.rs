use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "ehrbridge")]
#[command(about = "EHR bridge: SMART on FHIR sign-in and clinical data retrieval")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the TOML config file (defaults to ./ehrbridge.toml if present)
    #[arg(short, long, global = true, env = "EHRBRIDGE_CONFIG")]
    pub config: Option<String>,

    /// Clinician identifier that owns the session
    #[arg(short, long, global = true, env = "EHRBRIDGE_USER", default_value = "default")]
    pub user: String,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the EHR authorization URL
    Authorize,
    /// Sign in: open the URL, then paste the redirect URL (or code) back
    Login,
    /// Redeem an authorization code
    Exchange(ExchangeArgs),
    /// Show the current session
    Status,
    /// Forget the session and delete stored tokens
    Logout,
    /// List Beaker lab reports for a patient
    Beaker(PatientArgs),
    /// List all lab reports for a patient
    Labs(PatientArgs),
    /// List genomic observations for a patient
    Genomics(PatientArgs),
    /// Read or search any resource type
    Get(GetArgs),
    /// Generate a fresh encryption key (hex)
    Keygen,
    /// Redact PHI from text
    Redact(RedactArgs),
}

#[derive(clap::Args)]
pub struct ExchangeArgs {
    /// Authorization code, or the full redirect URL containing it
    #[arg(long)]
    pub code: String,
    /// State printed by `authorize`; the redirect URL must carry the same value
    #[arg(long)]
    pub state: Option<String>,
}

#[derive(clap::Args)]
pub struct PatientArgs {
    /// FHIR Patient id
    #[arg(short, long)]
    pub patient: String,
}

#[derive(clap::Args)]
pub struct GetArgs {
    /// Resource type (e.g. Observation)
    pub resource_type: String,
    /// Resource id; omit to search
    pub id: Option<String>,
    /// Search parameter as key=value (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,
}

#[derive(clap::Args)]
pub struct RedactArgs {
    /// Text to redact
    pub text: String,
}

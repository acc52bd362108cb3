use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "o365beat")]
#[command(about = "Ships Office 365 Management Activity audit logs to a configured output")]
pub struct CliArgs {
    /// 設定檔路徑
    #[arg(long, default_value = "o365beat.toml")]
    pub config: String,

    #[arg(long, help = "Run a single poll cycle and exit")]
    pub once: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Enable system monitoring stats")]
    pub monitor: bool,
}

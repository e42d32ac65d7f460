/// Local tooling for event-triggered functions
#[derive(clap::Parser, Clone, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CfnDev {
    #[command(subcommand)]
    pub command: CfnCommands,
}

#[derive(clap::Subcommand, Clone, Debug)]
pub enum CfnCommands {
    /// Print the deployment descriptor of a function
    #[clap(aliases = &["desc", "d"])]
    Describe {
        #[clap(flatten)]
        target: TargetArgs,
        #[clap(flatten)]
        deploy: DeployArgs,
    },
    /// Replay a raw invocation through an echo handler
    #[clap(aliases = &["ivk", "i"])]
    Invoke {
        #[clap(flatten)]
        target: TargetArgs,
        /// Raw invocation JSON as a file path or stdin (use `-` for stdin)
        #[arg(short, long, default_value = "-")]
        file: clap_stdin::FileOrStdin,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerKind {
    Firestore,
    Pubsub,
    Schedule,
    Database,
    Analytics,
    Auth,
    RemoteConfig,
}

#[derive(clap::Args, Clone, Debug)]
pub struct TargetArgs {
    #[arg(short, long, value_enum)]
    pub kind: TriggerKind,
    /// Document path, topic, schedule expression, ref path or event name
    #[arg(short, long, default_value = "")]
    pub target: String,
    /// Operation, e.g. `create` or `write` (defaults to the broadest one)
    #[arg(short, long)]
    pub event: Option<String>,
    /// Realtime Database instance; the configured databaseURL otherwise
    #[arg(long)]
    pub instance: Option<String>,
    /// Time zone of a schedule
    #[arg(long)]
    pub time_zone: Option<String>,
    /// Build without a trigger resource
    #[arg(long)]
    pub handler_namespace: bool,
}

#[derive(clap::Args, Clone, Debug, Default)]
pub struct DeployArgs {
    #[arg(short, long)]
    pub region: Vec<String>,
    #[arg(short, long)]
    pub memory: Option<String>,
    /// Timeout in seconds
    #[arg(long)]
    pub timeout: Option<u32>,
}

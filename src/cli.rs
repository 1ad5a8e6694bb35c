use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "skew",
    version,
    about = "Compare workload versions across Kubernetes clusters."
)]
pub struct CliArgs {
    /// Path to a config file (defaults to the usual discovery locations)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Cluster id to select at startup (repeatable)
    #[arg(short, long = "cluster")]
    pub clusters: Vec<String>,

    /// Namespace to filter on (repeatable)
    #[arg(short, long = "namespace")]
    pub namespaces: Vec<String>,

    /// Resource kind to show: deploy, cj, sts (repeatable)
    #[arg(short, long = "kind")]
    pub kinds: Vec<String>,

    /// Show only workloads whose versions differ between clusters
    #[arg(long)]
    pub only_divergent: bool,

    /// Look up newer versions for the listed workloads
    #[arg(long)]
    pub check_updates: bool,

    /// Auto refresh interval in seconds, 0 disables it
    #[arg(long, default_value_t = 60)]
    pub refresh_secs: u64,

    /// Load once, print the grouped view as JSON and exit
    #[arg(long)]
    pub snapshot: bool,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Write logs to this file while the terminal UI runs
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::CliArgs;
    use clap::Parser;

    #[test]
    fn repeatable_filters_collect() {
        let args = CliArgs::parse_from([
            "skew",
            "-c",
            "cluster-dev",
            "--cluster",
            "cluster-prod",
            "-k",
            "deploy",
            "--check-updates",
        ]);

        assert_eq!(args.clusters, ["cluster-dev", "cluster-prod"]);
        assert_eq!(args.kinds, ["deploy"]);
        assert!(args.check_updates);
        assert!(!args.only_divergent);
        assert_eq!(args.refresh_secs, 60);
    }
}

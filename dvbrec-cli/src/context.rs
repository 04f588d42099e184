use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand};

#[derive(Debug, Parser)]
#[clap(name = "dvbrec")]
#[clap(about = "dvbrec tunes a Linux DVB adapter and records channels from its transport stream.", long_about = None)]
#[clap(version)]
pub(crate) struct Cli {
    /// The adapter directory, e.g. `/dev/dvb/adapter0`.
    #[clap(short, long, global = true, value_name = "PATH")]
    pub adapter: Option<PathBuf>,

    /// The channel list (`channels.conf` as written by szap/czap/tzap).
    #[clap(short = 'C', long, global = true, value_name = "PATH")]
    pub channels: Option<PathBuf>,

    /// Configuration file. `dvbrec.toml` in the working directory is used
    /// when present.
    #[clap(short = 'f', long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Directory where log files are stored.
    #[clap(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Number of days to keep log files.
    #[clap(long, global = true, value_name = "DAYS")]
    pub log_retention_days: Option<u64>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Record a channel.{n}
    /// The stream goes to a file, to a UDP destination, or both.
    /// Recording stops on Ctrl-C or after the given duration.
    #[clap(group(
        ArgGroup::new("sink")
            .required(true)
            .multiple(true)
            .args(&["output", "udp"]),
    ))]
    Record {
        /// The channel name as listed in the channel list.
        #[clap(short, long)]
        channel: String,

        /// Output file. Further chunks are named `<output>.0001`, ...
        #[clap(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Send the stream to `host:port` or `host/port`.{n}
        /// Multicast groups are joined automatically.
        #[clap(long, value_name = "ADDRESS")]
        udp: Option<String>,

        /// Remux the TS into a PES stream before output.
        #[clap(long)]
        remux: bool,

        /// Roll over to a new output file after this many bytes (0: never).
        #[clap(long, value_name = "BYTES")]
        max_chunk_size: Option<u64>,

        /// Stop after this many seconds.
        #[clap(short = 't', long, value_name = "SECONDS")]
        duration: Option<u64>,
    },

    /// List the channels of the channel list, grouped by bouquet.
    List,

    /// Print the video and audio PID of a channel.
    Pids {
        /// The channel name.
        channel: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_record_args() {
        let cli = Cli::try_parse_from([
            "dvbrec", "-a", "/dev/dvb/adapter1", "record", "-c", "BBC1", "-o", "bbc1.ts", "-t",
            "60",
        ])
        .unwrap();
        assert_eq!(cli.adapter, Some(PathBuf::from("/dev/dvb/adapter1")));
        match cli.command {
            Commands::Record {
                channel,
                output,
                udp,
                duration,
                remux,
                ..
            } => {
                assert_eq!(channel, "BBC1");
                assert_eq!(output, Some(PathBuf::from("bbc1.ts")));
                assert_eq!(udp, None);
                assert_eq!(duration, Some(60));
                assert!(!remux);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_record_requires_a_sink() {
        assert!(Cli::try_parse_from(["dvbrec", "record", "-c", "BBC1"]).is_err());
        assert!(Cli::try_parse_from(["dvbrec", "record", "-c", "BBC1", "--udp", "239.0.0.1:1234"]).is_ok());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["dvbrec", "pids", "BBC1", "-v", "-C", "my.conf"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.channels, Some(PathBuf::from("my.conf")));
        assert!(matches!(cli.command, Commands::Pids { ref channel } if channel == "BBC1"));
    }
}

//! Shareline CLI - Browse and edit shares served from a local directory
//!
//! Usage:
//!   shareline ls //host/share/dir          List a directory
//!   shareline find //host/share 'Dir1'     Search a tree by name
//!   shareline cat //host/share/file.txt    Print a file
//!   shareline put //host/share/file.txt    Write stdin to a file
//!
//! Every subdirectory of `--root` is served as a share; the server name in an
//! address is not interpreted.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use shareline_client::{open_address, LocalTransport, ShareItem, ShareNode};
use shareline_core::{Config, ConfigError, CreationStrategy, Credentials, EntryKind};

#[derive(Parser)]
#[command(name = "shareline")]
#[command(about = "Browse file shares", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory whose subdirectories are served as shares
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// User name (anonymous if omitted)
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Password
    #[arg(long, global = true, env = "SHARELINE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List a directory
    Ls {
        /// Address (e.g., \\host\share\dir)
        address: String,

        /// Descend into subdirectories
        #[arg(short = 'R', long)]
        recursive: bool,
    },

    /// Find entries whose name fully matches a regular expression
    Find {
        address: String,

        pattern: String,

        /// Only search the directory itself
        #[arg(long)]
        shallow: bool,
    },

    /// Show metadata of an entry
    Stat { address: String },

    /// Print a file to stdout
    Cat { address: String },

    /// Write stdin to a file
    Put {
        address: String,

        /// Append instead of replacing the content
        #[arg(short, long)]
        append: bool,
    },

    /// Create a directory (no-op if it exists)
    Mkdir { address: String },

    /// Delete a file, or a directory with everything in it
    Rm { address: String },

    /// Rename an entry within its directory
    Mv {
        address: String,

        new_name: String,

        /// Replace an existing entry of the same kind
        #[arg(long)]
        replace: bool,
    },

    /// Copy a file on the server
    Cp { source: String, destination: String },

    /// Print the configuration, or write the default one
    Config {
        /// Write the default configuration file
        #[arg(long)]
        init: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load();
    let shell = Shell::new(&cli, &config)?;

    match &cli.command {
        Commands::Ls { address, recursive } => shell.ls(address, *recursive),
        Commands::Find {
            address,
            pattern,
            shallow,
        } => shell.find(address, pattern, !*shallow),
        Commands::Stat { address } => shell.stat(address),
        Commands::Cat { address } => shell.cat(address),
        Commands::Put { address, append } => shell.put(address, *append),
        Commands::Mkdir { address } => shell.mkdir(address),
        Commands::Rm { address } => shell.rm(address),
        Commands::Mv {
            address,
            new_name,
            replace,
        } => shell.mv(address, new_name, *replace),
        Commands::Cp {
            source,
            destination,
        } => shell.cp(source, destination),
        Commands::Config { init } => run_config(&config, *init),
    }
}

fn run_config(config: &Config, init: bool) -> anyhow::Result<()> {
    if init {
        let path = Config::default_path().ok_or(ConfigError::NoConfigDir)?;
        config.save_to(&path).context("cannot write configuration")?;
        info!("Wrote {}", path.display());
        return Ok(());
    }
    print!("{}", config.to_toml()?);
    Ok(())
}

struct Shell {
    transport: Arc<LocalTransport>,
    credentials: Credentials,
    config: Config,
}

impl Shell {
    fn new(cli: &Cli, config: &Config) -> anyhow::Result<Self> {
        let root = match cli.root.clone().or_else(|| config.local.root.clone()) {
            Some(root) => root,
            None => std::env::current_dir()?,
        };
        debug!("Serving shares from {}", root.display());

        let credentials = match &cli.user {
            Some(user) => Credentials::new(user.clone(), cli.password.clone().unwrap_or_default()),
            None => Credentials::anonymous(),
        };

        Ok(Self {
            transport: Arc::new(LocalTransport::new(root)),
            credentials,
            config: config.clone(),
        })
    }

    fn open(&self, address: &str, strategy: CreationStrategy) -> anyhow::Result<ShareItem> {
        let item = open_address(
            self.transport.clone(),
            address,
            self.credentials.clone(),
            self.config.connection.clone(),
            strategy,
        )
        .with_context(|| format!("cannot open {}", address))?;
        Ok(item)
    }

    fn ls(&self, address: &str, recursive: bool) -> anyhow::Result<()> {
        let item = self.open(address, CreationStrategy::FailIfAbsent)?;
        let Some(dir) = item.as_directory() else {
            print_item(&item)?;
            return Ok(());
        };
        for entry in dir.list_files(|_: &ShareItem| true, recursive)? {
            print_item(&entry)?;
        }
        Ok(())
    }

    fn find(&self, address: &str, pattern: &str, recursive: bool) -> anyhow::Result<()> {
        let item = self.open(address, CreationStrategy::FailIfAbsent)?;
        let Some(dir) = item.as_directory() else {
            bail!("{} is not a directory", item.full_address());
        };
        for entry in dir.list_files_matching(pattern, recursive)? {
            println!("{}", entry.full_address());
        }
        Ok(())
    }

    fn stat(&self, address: &str) -> anyhow::Result<()> {
        let item = self.open(address, CreationStrategy::FailIfAbsent)?;
        println!("address:     {}", item.full_address());
        println!("kind:        {}", item.kind());
        if let Some(file) = item.as_file() {
            println!("size:        {}", file.size()?);
        }
        println!("hidden:      {}", item.is_hidden());
        println!("created:     {}", item.creation_time()?.to_rfc3339());
        println!("accessed:    {}", item.last_access_time()?.to_rfc3339());
        println!("written:     {}", item.last_write_time()?.to_rfc3339());
        println!("changed:     {}", item.change_time()?.to_rfc3339());
        Ok(())
    }

    fn cat(&self, address: &str) -> anyhow::Result<()> {
        let item = self.open(address, CreationStrategy::FailIfAbsent)?;
        let Some(file) = item.as_file() else {
            bail!("{} is a directory", item.full_address());
        };
        let mut reader = file.input_stream()?;
        io::copy(&mut reader, &mut io::stdout().lock())?;
        reader.close()?;
        Ok(())
    }

    fn put(&self, address: &str, append: bool) -> anyhow::Result<()> {
        let item = self.open(address, CreationStrategy::AsFile)?;
        let Some(file) = item.as_file() else {
            bail!("{} is a directory", item.full_address());
        };

        let mut content = Vec::new();
        io::stdin().lock().read_to_end(&mut content)?;

        let mut writer = file.output_stream_with(append)?;
        writer.write_all(&content)?;
        writer.close()?;
        info!("Wrote {} bytes to {}", content.len(), file.full_address());
        Ok(())
    }

    fn mkdir(&self, address: &str) -> anyhow::Result<()> {
        let item = self.open(address, CreationStrategy::AsDirectory)?;
        let Some(dir) = item.as_directory() else {
            bail!("{} is a file", item.full_address());
        };
        dir.ensure_exists()?;
        Ok(())
    }

    fn rm(&self, address: &str) -> anyhow::Result<()> {
        match self.open(address, CreationStrategy::FailIfAbsent)? {
            ShareItem::Directory(dir) => dir.delete_directory_recursively()?,
            ShareItem::File(file) => file.delete_file()?,
        }
        Ok(())
    }

    fn mv(&self, address: &str, new_name: &str, replace: bool) -> anyhow::Result<()> {
        let renamed: ShareItem = match self.open(address, CreationStrategy::FailIfAbsent)? {
            ShareItem::Directory(dir) => dir.rename_to(new_name, replace)?.into(),
            ShareItem::File(file) => file.rename_to(new_name, replace)?.into(),
        };
        info!("Renamed to {}", renamed.full_address());
        Ok(())
    }

    fn cp(&self, source: &str, destination: &str) -> anyhow::Result<()> {
        let source = self.open(source, CreationStrategy::FailIfAbsent)?;
        let destination = self.open(destination, CreationStrategy::AsFile)?;
        match (source.as_file(), destination.as_file()) {
            (Some(from), Some(to)) => {
                from.copy_via_server_side_copy(to)?;
                Ok(())
            }
            _ => bail!("only files can be copied"),
        }
    }
}

fn print_item(item: &ShareItem) -> io::Result<()> {
    let marker = if item.kind() == EntryKind::Directory { "/" } else { "" };
    writeln!(io::stdout().lock(), "{}{}", item.path(), marker)
}

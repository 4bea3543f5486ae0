//! DriveConnect CLI - interactive Google Drive client.
//!
//! Authenticates against Google Drive on startup, then runs a numbered menu
//! for listing, looking up, downloading and uploading files.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use driveconnect_common::FileId;
use driveconnect_storage::gdrive::{
    AuthOutcome, ClientConfig, ConsentPrompt, CredentialManager, DriveClient, FileLookup,
    TokenStore, DEFAULT_TOKEN_FILE, VALIDATION_CODE_LEN,
};
use driveconnect_storage::HttpExchange;

/// Process exit code for initialization or fatal errors.
const EXIT_FATAL: i32 = -1;

#[derive(Parser)]
#[command(name = "driveconnect")]
#[command(about = "DriveConnect - Google Drive from the command line")]
#[command(version)]
struct Cli {
    /// Path to the OAuth2 client secret file.
    config: PathBuf,

    /// Token cache file.
    #[arg(long, default_value = DEFAULT_TOKEN_FILE)]
    token_file: PathBuf,

    /// Directory downloaded files are written to.
    #[arg(long, default_value = ".")]
    download_dir: PathBuf,

    /// Renew a stale access token before each Drive operation.
    #[arg(long)]
    auto_renew: bool,

    /// Only print the consent URL; do not launch a browser.
    #[arg(long)]
    no_browser: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuChoice {
    List,
    FileId,
    Download,
    Upload,
    Renew,
    Quit,
}

impl MenuChoice {
    fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(MenuChoice::List),
            "2" => Some(MenuChoice::FileId),
            "3" => Some(MenuChoice::Download),
            "4" => Some(MenuChoice::Upload),
            "5" => Some(MenuChoice::Renew),
            "6" => Some(MenuChoice::Quit),
            _ => None,
        }
    }
}

const MENU: &str = "Select an option:
1 - List files on Google Drive
2 - Get a file id using filename
3 - Download a file
4 - Upload a file
5 - Renew token
6 - Quit";

/// Line-oriented terminal I/O.
struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn say(&mut self, text: impl std::fmt::Display) {
        // A closed stdout leaves nothing useful to report to.
        let _ = writeln!(self.output, "{}", text);
        let _ = self.output.flush();
    }

    /// Read one line without its terminator; `None` at end of input.
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(&['\r', '\n'][..]).to_string()))
    }

    fn ask(&mut self, question: &str) -> io::Result<Option<String>> {
        self.say(question);
        self.read_line()
    }
}

/// Consent prompt on the terminal, optionally launching a browser.
struct TerminalPrompt<'a, R, W> {
    console: &'a mut Console<R, W>,
    open_browser: bool,
}

impl<R: BufRead, W: Write> ConsentPrompt for TerminalPrompt<'_, R, W> {
    fn present_consent_url(&mut self, url: &str) {
        self.console
            .say("Open the following URL in a browser and grant access:");
        self.console.say(url);

        if self.open_browser {
            if let Err(e) = open::that(url) {
                warn!("Could not launch a browser: {}", e);
            }
        }
    }

    fn read_validation_code(&mut self) -> driveconnect_common::Result<String> {
        let code = self
            .console
            .ask("Enter the validation code (empty to cancel):")?;
        Ok(code.unwrap_or_default())
    }

    fn reject_code(&mut self, length: usize) {
        self.console.say(format!(
            "Invalid code: {} characters, expected {}",
            length, VALIDATION_CODE_LEN
        ));
    }
}

/// Authenticated state shared by the menu actions.
struct Session {
    credentials: CredentialManager,
    drive: DriveClient,
    download_dir: PathBuf,
    auto_renew: bool,
}

impl Session {
    async fn prepare(&mut self) -> Result<()> {
        if self.auto_renew && self.credentials.ensure_fresh().await? {
            info!("Access token renewed");
        }
        Ok(())
    }

    async fn list<R: BufRead, W: Write>(&mut self, console: &mut Console<R, W>) -> Result<()> {
        self.prepare().await?;
        let token = self.credentials.access_token()?;

        console.say("Listing files");
        let files = self
            .drive
            .list_files(token)
            .await
            .context("Failed to list files")?;

        for (index, file) in files.iter().enumerate() {
            console.say(format!(
                "{} - {} - {} - {}",
                index,
                file.id,
                file.title,
                file.original_filename.as_deref().unwrap_or("")
            ));
        }
        Ok(())
    }

    async fn file_id<R: BufRead, W: Write>(&mut self, console: &mut Console<R, W>) -> Result<()> {
        let Some(name) = console.ask("Enter the filename:")? else {
            return Ok(());
        };

        self.prepare().await?;
        let token = self.credentials.access_token()?;
        let lookup = self
            .drive
            .get_file_id(token, &name)
            .await
            .context("Failed to look up file")?;

        if let FileLookup::Ambiguous(count) = lookup {
            console.say(format!("{} files share this name", count));
        }
        console.say(format!("File id: {}", lookup.id()));
        Ok(())
    }

    async fn download<R: BufRead, W: Write>(
        &mut self,
        console: &mut Console<R, W>,
    ) -> Result<()> {
        let Some(input) = console.ask("Enter the file id:")? else {
            return Ok(());
        };
        let id = FileId::new(input).context("Invalid file id")?;

        self.prepare().await?;
        let token = self.credentials.access_token()?;
        let report = self
            .drive
            .get_file_by_id(token, &id, &self.download_dir)
            .await
            .with_context(|| format!("Failed to download {}", id))?;

        console.say(format!(
            "Saved {} ({} bytes)",
            report.path.display(),
            report.bytes
        ));
        Ok(())
    }

    async fn upload<R: BufRead, W: Write>(&mut self, console: &mut Console<R, W>) -> Result<()> {
        let Some(input) = console.ask("Enter the file name:")? else {
            return Ok(());
        };
        let path = Path::new(input.trim());

        self.prepare().await?;
        let token = self.credentials.access_token()?;
        let report = self
            .drive
            .put_file(token, path)
            .await
            .with_context(|| format!("Failed to upload {}", path.display()))?;

        console.say(format!(
            "Uploaded {} bytes in {:.3} seconds ({:.3} bytes/sec)",
            report.bytes,
            report.elapsed.as_secs_f64(),
            report.bytes_per_sec()
        ));
        if let Some(file_id) = report.file_id {
            console.say(format!("New file id: {}", file_id));
        }
        Ok(())
    }

    async fn renew<R: BufRead, W: Write>(&mut self, console: &mut Console<R, W>) -> Result<()> {
        console.say("Renewing token");
        self.credentials
            .renew_token()
            .await
            .context("Failed to renew token")?;
        Ok(())
    }
}

/// Run the menu until the user quits or input ends.
async fn run_menu<R: BufRead, W: Write>(
    session: &mut Session,
    console: &mut Console<R, W>,
) -> Result<()> {
    loop {
        let Some(input) = console.ask(MENU)? else {
            return Ok(());
        };

        let outcome = match MenuChoice::parse(&input) {
            Some(MenuChoice::List) => session.list(console).await,
            Some(MenuChoice::FileId) => session.file_id(console).await,
            Some(MenuChoice::Download) => session.download(console).await,
            Some(MenuChoice::Upload) => session.upload(console).await,
            Some(MenuChoice::Renew) => session.renew(console).await,
            Some(MenuChoice::Quit) => {
                console.say("Exiting");
                return Ok(());
            }
            None => {
                console.say(format!("Unknown option: {}", input.trim()));
                Ok(())
            }
        };

        if let Err(e) = outcome {
            console.say(format!("Error: {:#}", e));
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ClientConfig::load(&cli.config).context("Connection did not open properly")?;
    let exchange = HttpExchange::new().context("Failed to initialize HTTP client")?;

    let mut credentials =
        CredentialManager::new(config, TokenStore::new(&cli.token_file), exchange.clone());

    let stdin = io::stdin();
    let mut console = Console::new(stdin.lock(), io::stdout());

    let outcome = {
        let mut prompt = TerminalPrompt {
            console: &mut console,
            open_browser: !cli.no_browser,
        };
        credentials
            .get_token(&mut prompt)
            .await
            .context("Unable to acquire access token")?
    };

    if outcome == AuthOutcome::Cancelled {
        anyhow::bail!("Unable to acquire access token");
    }
    info!(?outcome, "Ready");

    let mut session = Session {
        credentials,
        drive: DriveClient::new(exchange),
        download_dir: cli.download_dir,
        auto_renew: cli.auto_renew,
    };

    run_menu(&mut session, &mut console).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set up logging: {}", e);
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(EXIT_FATAL);
    }
}

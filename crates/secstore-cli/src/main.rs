//! secstore CLI: `secstore` command.
//!
//! Inspects store files and exercises the credential codec and lock naming
//! from the command line.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use secstore::storage::NamedFileLock;
use secstore::time;
use secstore::{
    ChangeDetection, CredentialCodec, CredentialFormat, EncryptionKey, ObjectStore, Profile, Role,
    SecurityConfig, StoreOptions, User, UserStore,
};

/// HKDF info string binding derived keys to credential encryption.
const KEY_CONTEXT: &str = "secstore/credentials/v1";

// ── CLI structure ─────────────────────────────────────────────────────────────

/// secstore CLI: inspect security stores and exercise their codecs.
#[derive(Parser, Debug)]
#[command(
    name = "secstore",
    about = "secstore CLI",
    version,
    long_about = "secstore: inspect single-file security stores\n\nShow user, role and profile stores, add users, encode and verify\ncredentials, and resolve the cross-process lock name of a store file."
)]
struct Cli {
    /// Provider configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the contents of a store file
    Show {
        /// Store file
        file: PathBuf,

        /// Record kind held by the file
        #[arg(long, value_enum, default_value_t = StoreKind::Raw)]
        kind: StoreKind,
    },

    /// Add a user to a user store, encoding the password
    AddUser {
        /// User store file (created if missing)
        file: PathBuf,

        user_name: String,

        #[arg(long)]
        password: String,

        #[arg(long, default_value = "")]
        email: String,

        /// Credential format: clear, hashed, encrypted
        #[arg(long)]
        format: Option<String>,

        /// Secret the encryption key is derived from
        #[arg(long)]
        key_secret: Option<String>,
    },

    /// Encode a password in the configured (or given) format
    EncodePassword {
        password: String,

        /// Credential format: clear, hashed, encrypted
        #[arg(long)]
        format: Option<String>,

        /// Reuse an existing salt instead of generating one
        #[arg(long)]
        salt: Option<String>,

        /// Secret the encryption key is derived from
        #[arg(long)]
        key_secret: Option<String>,
    },

    /// Check a candidate password against a stored value
    VerifyPassword {
        candidate: String,

        /// Stored value
        #[arg(long)]
        stored: String,

        /// Stored salt (empty for clear passwords)
        #[arg(long, default_value = "")]
        salt: String,

        /// Credential format: clear, hashed, encrypted
        #[arg(long)]
        format: Option<String>,

        /// Secret the encryption key is derived from
        #[arg(long)]
        key_secret: Option<String>,
    },

    /// Recover a clear or encrypted password
    DecodePassword {
        stored: String,

        /// Credential format: clear, hashed, encrypted
        #[arg(long)]
        format: Option<String>,

        /// Secret the encryption key is derived from
        #[arg(long)]
        key_secret: Option<String>,
    },

    /// Print the lock name and lock file used for a store path
    LockName {
        path: PathBuf,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Users,
    Roles,
    Profiles,
    Raw,
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let verbose = cli.verbose;

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Show { file, kind } => cmd_show(&config, &file, kind, verbose),
        Commands::AddUser {
            file,
            user_name,
            password,
            email,
            format,
            key_secret,
        } => cmd_add_user(
            &config,
            &file,
            &user_name,
            &password,
            &email,
            format.as_deref(),
            key_secret.as_deref(),
        ),
        Commands::EncodePassword {
            password,
            format,
            salt,
            key_secret,
        } => cmd_encode_password(
            &config,
            &password,
            format.as_deref(),
            salt.as_deref(),
            key_secret.as_deref(),
            verbose,
        ),
        Commands::VerifyPassword {
            candidate,
            stored,
            salt,
            format,
            key_secret,
        } => cmd_verify_password(
            &config,
            &candidate,
            &stored,
            &salt,
            format.as_deref(),
            key_secret.as_deref(),
        ),
        Commands::DecodePassword {
            stored,
            format,
            key_secret,
        } => cmd_decode_password(&config, &stored, format.as_deref(), key_secret.as_deref()),
        Commands::LockName { path } => cmd_lock_name(&config, &path),
    });

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> Result<SecurityConfig> {
    match path {
        Some(p) => SecurityConfig::from_file(p)
            .with_context(|| format!("failed to load config {}", p.display())),
        None => Ok(SecurityConfig::default()),
    }
}

fn build_codec(
    config: &SecurityConfig,
    format: Option<&str>,
    key_secret: Option<&str>,
) -> Result<CredentialCodec> {
    let format = match format {
        Some(f) => f.parse::<CredentialFormat>()?,
        None => config.password_format,
    };
    log::debug!("credential format {format}");
    let key = key_secret
        .map(|secret| EncryptionKey::derive(secret.as_bytes(), KEY_CONTEXT))
        .transpose()?;
    Ok(CredentialCodec::new(format, key, config.case_sensitive)?)
}

/// Options for read-only inspection: no file creation, no watcher.
fn inspect_options(config: &SecurityConfig) -> StoreOptions {
    StoreOptions {
        auto_create: false,
        change_detection: ChangeDetection::Disabled,
        ..config.store.clone()
    }
}

fn open_store<T>(config: &SecurityConfig, file: &Path) -> Result<ObjectStore<T>>
where
    T: serde::Serialize + serde::de::DeserializeOwned + Default + Send + 'static,
{
    if !file.exists() {
        return Err(anyhow!("store file {} not found", file.display()));
    }
    let store = ObjectStore::with_options(file, inspect_options(config))?;
    store
        .load()
        .with_context(|| format!("failed to load {}", file.display()))?;
    Ok(store)
}

// ── Command implementations ───────────────────────────────────────────────────

/// `secstore show FILE [--kind KIND]`
fn cmd_show(config: &SecurityConfig, file: &Path, kind: StoreKind, verbose: bool) -> Result<()> {
    let stamp = |t| time::to_rfc3339(t, config.use_universal_time);

    match kind {
        StoreKind::Users => {
            let users: Vec<User> = open_store(config, file)?.value()?;
            println!("Users ({}):", users.len());
            for user in &users {
                let state = match (user.is_approved, user.is_locked_out) {
                    (_, true) => "locked",
                    (false, false) => "pending",
                    (true, false) => "active",
                };
                println!("  {}  [{state}]  {}", user.user_name, user.email);
                if verbose {
                    println!("    key:        {}", user.user_key);
                    println!("    created:    {}", stamp(user.creation_date));
                    println!("    last login: {}", stamp(user.last_login_date));
                    println!("    failures:   {}", user.failed_password_attempt_count);
                }
            }
        }
        StoreKind::Roles => {
            let roles: Vec<Role> = open_store(config, file)?.value()?;
            println!("Roles ({}):", roles.len());
            for role in &roles {
                println!("  {}  ({} user(s))", role.name, role.users.len());
                if verbose {
                    for user in &role.users {
                        println!("    - {user}");
                    }
                }
            }
        }
        StoreKind::Profiles => {
            let profiles: Vec<Profile> = open_store(config, file)?.value()?;
            println!("Profiles ({}):", profiles.len());
            for profile in &profiles {
                let anon = if profile.authenticated { "" } else { "  (anonymous)" };
                println!(
                    "  {}  updated {}{anon}",
                    profile.user_name,
                    stamp(profile.last_updated)
                );
                if verbose {
                    match profile.encoded().names_text() {
                        Ok(names) => println!("    names: {names}"),
                        Err(e) => println!("    names: <undecodable: {e}>"),
                    }
                }
            }
        }
        StoreKind::Raw => {
            let value: serde_json::Value = open_store(config, file)?.value()?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}

/// `secstore add-user FILE NAME --password P [--email E]`
fn cmd_add_user(
    config: &SecurityConfig,
    file: &Path,
    user_name: &str,
    password: &str,
    email: &str,
    format: Option<&str>,
    key_secret: Option<&str>,
) -> Result<()> {
    let codec = build_codec(config, format, key_secret)?;
    let mut user = User::new(user_name);
    user.email = email.to_string();
    user.set_credential(codec.encode(password, None)?);

    // One-shot process: nothing would consume change notifications.
    let options = StoreOptions {
        change_detection: ChangeDetection::Disabled,
        ..config.store.clone()
    };
    let store: UserStore = ObjectStore::with_options(file, options)?;
    let case_sensitive = config.case_sensitive;
    let added = store
        .update(|users| {
            if users.iter().any(|u| u.name_matches(user_name, case_sensitive)) {
                return false;
            }
            users.push(user);
            true
        })
        .with_context(|| format!("failed to update {}", file.display()))?;

    if !added {
        return Err(anyhow!("user {user_name} already exists"));
    }
    log::info!("added {user_name} to {}", file.display());
    println!("Added: {user_name}");
    Ok(())
}

/// `secstore encode-password PASSWORD [--format F] [--salt S] [--key-secret K]`
fn cmd_encode_password(
    config: &SecurityConfig,
    password: &str,
    format: Option<&str>,
    salt: Option<&str>,
    key_secret: Option<&str>,
    verbose: bool,
) -> Result<()> {
    let codec = build_codec(config, format, key_secret)?;
    let encoded = codec.encode(password, salt)?;

    if verbose {
        println!("Format: {}", codec.format());
    }
    println!("Value: {}", encoded.value);
    println!("Salt:  {}", encoded.salt);
    Ok(())
}

/// `secstore verify-password CANDIDATE --stored V [--salt S]`
fn cmd_verify_password(
    config: &SecurityConfig,
    candidate: &str,
    stored: &str,
    salt: &str,
    format: Option<&str>,
    key_secret: Option<&str>,
) -> Result<()> {
    let codec = build_codec(config, format, key_secret)?;
    if codec.verify(candidate, stored, salt)? {
        println!("Password: match");
        Ok(())
    } else {
        Err(anyhow!("password does not match"))
    }
}

/// `secstore decode-password STORED [--format F] [--key-secret K]`
fn cmd_decode_password(
    config: &SecurityConfig,
    stored: &str,
    format: Option<&str>,
    key_secret: Option<&str>,
) -> Result<()> {
    let codec = build_codec(config, format, key_secret)?;
    let plain = codec.decode(stored).context("cannot recover password")?;
    println!("{plain}");
    Ok(())
}

/// `secstore lock-name PATH`
fn cmd_lock_name(config: &SecurityConfig, path: &Path) -> Result<()> {
    let locks = match &config.store.lock_dir {
        Some(dir) => NamedFileLock::with_lock_dir(dir),
        None => NamedFileLock::new(),
    };
    let name = secstore::lock_name(path)?;
    let lock_file = locks.lock_path(path)?;
    println!("Name: {name}");
    println!("File: {}", lock_file.display());
    Ok(())
}

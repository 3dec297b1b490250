//! Tessera local administration binary.
//!
//! Operates directly on the key store database; nothing is published.
//!
//! # Usage
//!
//! ```bash
//! export TESSERA_PASSPHRASE=...
//! tessera-server --db keys.redb enroll-device --alias sensor-1 --key <64 hex chars>
//! tessera-server --db keys.redb create-topic --key <64 hex chars> sensors/temp
//! tessera-server --db keys.redb link --alias sensor-1 sensors/temp
//! tessera-server --db keys.redb device-topics --alias sensor-1
//! ```

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use tessera_crypto::{KdfParams, Key, random_key};
use tessera_proto::DeviceId;
use tessera_server::{C2Error, KeyStore, RedbStorage};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Tessera key store administration
#[derive(Parser, Debug)]
#[command(name = "tessera-server")]
#[command(about = "Tessera key-custody store administration")]
#[command(version)]
struct Args {
    /// Path to the key store database (created if missing)
    #[arg(long, default_value = "tessera.redb")]
    db: PathBuf,

    /// Passphrase the KEK is derived from
    #[arg(long, env = "TESSERA_PASSPHRASE", hide_env_values = true)]
    passphrase: String,

    /// Argon2id memory cost in KiB
    #[arg(long, default_value_t = KdfParams::default().memory_kib)]
    kdf_memory_kib: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

/// Selects a device by hex id or by alias.
#[derive(ClapArgs, Debug)]
#[group(required = true, multiple = false)]
struct DeviceArg {
    /// Device id as 32 hex characters
    #[arg(long)]
    id: Option<DeviceId>,

    /// Alias the device id is derived from
    #[arg(long)]
    alias: Option<String>,
}

impl DeviceArg {
    fn resolve(&self) -> Result<DeviceId, C2Error> {
        match (&self.id, &self.alias) {
            (Some(id), _) => Ok(*id),
            (None, Some(alias)) => Ok(DeviceId::from_alias(alias)),
            (None, None) => Err(C2Error::Validation("either --id or --alias is required".into())),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a device's root key
    EnrollDevice {
        #[command(flatten)]
        device: DeviceArg,
        /// Root key as 64 hex characters
        #[arg(long, value_parser = parse_key)]
        key: Key,
    },
    /// Delete a device and its grants
    RemoveDevice {
        #[command(flatten)]
        device: DeviceArg,
    },
    /// Create a topic (random key unless one is given)
    CreateTopic {
        /// Topic name
        topic: String,
        /// Topic key as 64 hex characters
        #[arg(long, value_parser = parse_key)]
        key: Option<Key>,
    },
    /// Delete a topic and its grants
    RemoveTopic {
        /// Topic name
        topic: String,
    },
    /// Record that a device holds a topic
    Link {
        #[command(flatten)]
        device: DeviceArg,
        /// Topic name
        topic: String,
    },
    /// Remove a recorded grant
    Unlink {
        #[command(flatten)]
        device: DeviceArg,
        /// Topic name
        topic: String,
    },
    /// List enrolled devices
    ListDevices,
    /// List topics
    ListTopics,
    /// List the topics granted to a device
    DeviceTopics {
        #[command(flatten)]
        device: DeviceArg,
    },
    /// List the devices granted a topic
    TopicDevices {
        /// Topic name
        topic: String,
    },
}

fn parse_key(text: &str) -> Result<Key, String> {
    let bytes = hex::decode(text).map_err(|e| e.to_string())?;
    Key::try_from(bytes.as_slice()).map_err(|e| e.to_string())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let defaults = KdfParams::default();
    let kdf = KdfParams::new(args.kdf_memory_kib, defaults.time_cost, defaults.parallelism);

    tracing::debug!(db = %args.db.display(), "opening key store");
    let storage = RedbStorage::open(&args.db)?;
    let store = KeyStore::open(storage, &args.passphrase, &kdf)?;

    run(&store, args.command)?;
    Ok(())
}

#[allow(clippy::print_stdout)]
fn run(store: &KeyStore<RedbStorage>, command: Command) -> Result<(), C2Error> {
    match command {
        Command::EnrollDevice { device, key } => {
            let id = device.resolve()?;
            store.insert_id_key(&id, &key)?;
            tracing::info!(device = %id, "device enrolled");
            println!("{id}");
        },
        Command::RemoveDevice { device } => {
            let id = device.resolve()?;
            store.delete_id_key(&id)?;
            tracing::info!(device = %id, "device removed");
        },
        Command::CreateTopic { topic, key } => {
            let key = match key {
                Some(key) => key,
                None => random_key()?,
            };
            store.insert_topic_key(&topic, &key)?;
            tracing::info!(topic, "topic created");
        },
        Command::RemoveTopic { topic } => {
            store.delete_topic_key(&topic)?;
            tracing::info!(topic, "topic removed");
        },
        Command::Link { device, topic } => {
            let id = device.resolve()?;
            if store.link_id_topic(&id, &topic)? {
                tracing::info!(device = %id, topic, "grant recorded");
            } else {
                tracing::info!(device = %id, topic, "grant already recorded");
            }
        },
        Command::Unlink { device, topic } => {
            let id = device.resolve()?;
            if !store.unlink_id_topic(&id, &topic)? {
                tracing::warn!(device = %id, topic, "no such grant");
            }
        },
        Command::ListDevices => {
            for id in store.list_ids()? {
                println!("{id}");
            }
        },
        Command::ListTopics => {
            for topic in store.list_topics()? {
                println!("{topic}");
            }
        },
        Command::DeviceTopics { device } => {
            for topic in store.topics_for_id(&device.resolve()?)? {
                println!("{topic}");
            }
        },
        Command::TopicDevices { topic } => {
            for id in store.ids_for_topic(&topic)? {
                println!("{id}");
            }
        },
    }
    Ok(())
}

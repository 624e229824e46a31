use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use hvmodel_core::{
    NetworkAdapter, NetworkAdapterAttrs, Params, PowerShellInvoker, Server, Service,
    ServiceConfig,
};
use tabled::{Table, Tabled};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hvmodel")]
#[command(about = "Inspect and reconfigure Hyper-V resources", long_about = None)]
struct Cli {
    /// Hyper-V host to manage (local host when unset)
    #[arg(short, long, env = "HVMODEL_COMPUTER")]
    computer: Option<String>,

    /// Nesting depth requested for replies
    #[arg(long, default_value = "1")]
    json_depth: u32,

    /// PowerShell executable
    #[arg(long, env = "HVMODEL_PWSH", default_value = "pwsh")]
    pwsh: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the Hyper-V host
    Host,

    /// List virtual machines
    Vms,

    /// Start a VM
    Start {
        /// VM name or id
        vm: String,
    },

    /// Shut a VM down
    Stop {
        /// VM name or id
        vm: String,

        /// Turn the VM off instead of shutting the guest down
        #[arg(short, long)]
        force: bool,
    },

    /// List virtual switches
    Switches,

    /// List the network adapters of a VM
    Nics {
        /// VM name or id
        vm: String,
    },

    /// Add a network adapter to a VM
    AddNic {
        /// VM name or id
        vm: String,

        /// Adapter name
        #[arg(short, long)]
        name: Option<String>,

        /// Switch to connect to
        #[arg(short, long)]
        switch: Option<String>,

        /// Static MAC address (dynamic when unset)
        #[arg(long)]
        mac: Option<String>,
    },

    /// Reconfigure a network adapter
    SetNic {
        /// VM name or id
        vm: String,

        /// Adapter name
        nic: String,

        /// Connect to this switch
        #[arg(short, long, conflicts_with = "disconnect")]
        switch: Option<String>,

        /// Disconnect from the current switch
        #[arg(long)]
        disconnect: bool,

        /// Use this static MAC address
        #[arg(long, conflicts_with = "dynamic_mac")]
        mac: Option<String>,

        /// Switch back to a dynamic MAC address
        #[arg(long)]
        dynamic_mac: bool,
    },

    /// Remove a network adapter
    RemoveNic {
        /// VM name or id
        vm: String,

        /// Adapter name
        nic: String,
    },

    /// Configure VLAN tagging of a network adapter
    Vlan {
        /// VM name or id
        vm: String,

        /// Adapter name
        nic: String,

        /// Access mode with this VLAN id
        #[arg(long, conflicts_with_all = ["native", "untagged"])]
        access: Option<u16>,

        /// Trunk mode with this native VLAN id (requires --allowed)
        #[arg(long, requires = "allowed", conflicts_with = "untagged")]
        native: Option<u16>,

        /// VLAN ids carried in trunk mode, e.g. 1-100,200
        #[arg(long)]
        allowed: Option<String>,

        /// Remove VLAN tagging
        #[arg(long)]
        untagged: bool,
    },
}

#[derive(Tabled)]
struct VmRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "VCPUS")]
    vcpus: String,
    #[tabled(rename = "MEMORY")]
    memory: String,
}

impl From<&Server> for VmRow {
    fn from(vm: &Server) -> Self {
        let a = vm.attributes();
        Self {
            id: display(&a.id),
            name: display(&a.name),
            state: format_state(a.state.as_deref()),
            vcpus: display(&a.processor_count),
            memory: a
                .memory_startup
                .map(|bytes| format!("{}MB", bytes / (1024 * 1024)))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

#[derive(Tabled)]
struct NicRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "SWITCH")]
    switch: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "DYNAMIC")]
    dynamic: String,
    #[tabled(rename = "ADDRESSES")]
    addresses: String,
}

impl From<&NetworkAdapter> for NicRow {
    fn from(nic: &NetworkAdapter) -> Self {
        let a = nic.attributes();
        Self {
            name: display(&a.name),
            switch: display(&a.switch_name),
            mac: display(&a.mac_address),
            dynamic: display(&a.dynamic_mac_address_enabled),
            addresses: nic.ip_addresses().join(", "),
        }
    }
}

#[derive(Tabled)]
struct SwitchRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "TYPE")]
    switch_type: String,
    #[tabled(rename = "NOTES")]
    notes: String,
}

fn display<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string())
}

/// Hyper-V reports VM states as enum ordinals.
fn format_state(state: Option<&str>) -> String {
    match state {
        Some("2") => "Running".to_string(),
        Some("3") => "Off".to_string(),
        Some("6") => "Saved".to_string(),
        Some("9") => "Paused".to_string(),
        Some(other) => other.to_string(),
        None => "-".to_string(),
    }
}

async fn find_nic(service: &Service, vm: &str, nic: &str) -> Result<NetworkAdapter> {
    let vm = service
        .servers()
        .get_by(vm)
        .await
        .with_context(|| format!("looking up VM {vm}"))?;
    vm.network_adapters()
        .get(Params::new().with("name", nic))
        .await
        .with_context(|| format!("looking up network adapter {nic}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hvmodel=info,hvmodel_core=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ServiceConfig {
        computer_name: cli.computer,
        json_depth: cli.json_depth,
    };
    let service = Service::new(Arc::new(PowerShellInvoker::new(cli.pwsh)), config);

    match cli.command {
        Commands::Host => {
            let host = service
                .hosts()
                .get(Params::new())
                .await
                .context("reading VM host")?;
            let a = host.attributes();
            println!("Name:           {}", display(&a.name));
            println!("FQDN:           {}", display(&a.fully_qualified_domain_name));
            println!("Processors:     {}", display(&a.logical_processor_count));
            println!(
                "Memory:         {}",
                a.memory_capacity
                    .map(|bytes| format!("{}MB", bytes / (1024 * 1024)))
                    .unwrap_or_else(|| "-".to_string())
            );
            println!("VM path:        {}", display(&a.virtual_machine_path));
            println!("VHD path:       {}", display(&a.virtual_hard_disk_path));
            println!(
                "MAC range:      {} - {}",
                display(&a.mac_address_minimum),
                display(&a.mac_address_maximum)
            );
        }

        Commands::Vms => {
            let vms = service.servers().all(Params::new()).await?;
            if vms.is_empty() {
                println!("No VMs found");
            } else {
                println!("{}", Table::new(vms.iter().map(VmRow::from)));
            }
        }

        Commands::Start { vm } => {
            let mut vm = service.servers().get_by(&vm).await?;
            vm.start().await?;
            println!("{}", format_state(vm.attributes().state.as_deref()));
        }

        Commands::Stop { vm, force } => {
            let mut vm = service.servers().get_by(&vm).await?;
            vm.stop(force).await?;
            println!("{}", format_state(vm.attributes().state.as_deref()));
        }

        Commands::Switches => {
            let switches = service.switches().all(Params::new()).await?;
            let rows = switches.iter().map(|switch| {
                let a = switch.attributes();
                SwitchRow {
                    id: display(&a.id),
                    name: display(&a.name),
                    switch_type: display(&a.switch_type),
                    notes: display(&a.notes),
                }
            });
            println!("{}", Table::new(rows));
        }

        Commands::Nics { vm } => {
            let vm = service.servers().get_by(&vm).await?;
            let nics = vm.network_adapters().all(Params::new()).await?;
            println!("{}", Table::new(nics.iter().map(NicRow::from)));
        }

        Commands::AddNic {
            vm,
            name,
            switch,
            mac,
        } => {
            let vm = service.servers().get_by(&vm).await?;
            let nic = vm
                .network_adapters()
                .create(NetworkAdapterAttrs {
                    name,
                    switch_name: switch,
                    dynamic_mac_address_enabled: Some(mac.is_none()),
                    mac_address: mac,
                    ..Default::default()
                })
                .await?;
            info!(id = ?nic.identity(), "network adapter added");
            println!("{}", Table::new([NicRow::from(&nic)]));
        }

        Commands::SetNic {
            vm,
            nic,
            switch,
            disconnect,
            mac,
            dynamic_mac,
        } => {
            let mut nic = find_nic(&service, &vm, &nic).await?;
            {
                let a = nic.attributes_mut();
                if switch.is_some() {
                    a.switch_name = switch;
                } else if disconnect {
                    a.switch_name = None;
                }
                if mac.is_some() {
                    a.dynamic_mac_address_enabled = Some(false);
                    a.mac_address = mac;
                } else if dynamic_mac {
                    a.dynamic_mac_address_enabled = Some(true);
                }
            }
            if !nic.is_dirty() {
                println!("Nothing to change");
                return Ok(());
            }
            nic.save().await?;
            println!("{}", Table::new([NicRow::from(&nic)]));
        }

        Commands::RemoveNic { vm, nic } => {
            let nic = find_nic(&service, &vm, &nic).await?;
            nic.destroy().await?;
            println!("Removed {}", display(&nic.attributes().name));
        }

        Commands::Vlan {
            vm,
            nic,
            access,
            native,
            allowed,
            untagged,
        } => {
            let mut nic = find_nic(&service, &vm, &nic).await?;
            let vlan = nic.vlan_setting().await?;
            match (access, native, allowed) {
                (Some(id), _, _) => {
                    vlan.set_access(id);
                }
                (None, Some(native), Some(allowed)) => {
                    vlan.set_trunk(native, allowed);
                }
                _ if untagged => {
                    vlan.set_untagged();
                }
                _ => bail!("one of --access, --native/--allowed or --untagged is required"),
            }
            vlan.save().await?;
            println!("VLAN mode: {:?}", vlan.mode());
        }
    }

    Ok(())
}

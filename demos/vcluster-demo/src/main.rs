use std::io::Write;

use clap::Parser;
use env_logger::Builder;
use log::{info, warn};
use rand::prelude::*;
use rand_pcg::Pcg64;

use dslab_vcluster::config::DatacenterConfig;
use dslab_vcluster::datacenter::Datacenter;
use dslab_vcluster::error::AllocationError;
use dslab_vcluster::vm::VirtualMachine;

const VM_SIZES: [u32; 5] = [1, 2, 4, 8, 16];
const VM_CORE_MIPS: f64 = 1000.;

#[derive(Parser, Debug)]
#[clap(about, long_about = None)]
struct Args {
    /// Path to datacenter config
    #[clap(long, short, default_value = "config.yaml")]
    config: String,

    /// Number of VMs to place
    #[clap(long, short, default_value = "200")]
    vms: u32,

    /// Probability of releasing a random running VM after each placement
    #[clap(long, short, default_value = "0.3")]
    release_probability: f64,

    /// Random seed
    #[clap(long, short, default_value = "123")]
    seed: u64,

    /// Save placement trace to CSV file
    #[clap(long, short)]
    trace: Option<String>,
}

fn init_logger() {
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();
}

fn main() {
    init_logger();
    let args = Args::parse();
    if !(0. ..=1.).contains(&args.release_probability) {
        eprintln!("release probability should be within [0, 1]");
        std::process::exit(1);
    }

    let config = match DatacenterConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    let mut datacenter = match Datacenter::from_config(&config) {
        Ok(datacenter) => datacenter,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let mut ratios: Vec<f64> = config
        .hosts
        .iter()
        .flat_map(|host| host.catalog.ratios.iter().copied())
        .collect();
    ratios.sort_by(|a, b| a.total_cmp(b));
    ratios.dedup();

    let mut rand = Pcg64::seed_from_u64(args.seed);
    let mut running = Vec::new();
    let (mut placed, mut rejected, mut released) = (0, 0, 0);

    for vm_id in 0..args.vms {
        let pes = *VM_SIZES.choose(&mut rand).unwrap_or(&1);
        let ratio = *ratios.choose(&mut rand).unwrap_or(&1.);
        if let Err(e) = datacenter.add_vm(VirtualMachine::new(vm_id, pes, VM_CORE_MIPS, ratio)) {
            warn!("{}", e);
            continue;
        }
        match datacenter.place_vm(vm_id) {
            Ok(_) => {
                placed += 1;
                running.push(vm_id);
            }
            Err(AllocationError::PlacementExhausted { .. }) => rejected += 1,
            Err(e) => {
                warn!("{}", e);
                rejected += 1;
            }
        }

        if !running.is_empty() && rand.gen_bool(args.release_probability) {
            let vm_id = running.swap_remove(rand.gen_range(0..running.len()));
            match datacenter.release_vm(vm_id) {
                Ok(_) => released += 1,
                Err(e) => warn!("{}", e),
            }
        }
    }

    info!(
        "placed {} VMs, rejected {} VMs, released {} VMs",
        placed, rejected, released
    );
    for host in datacenter.hosts() {
        let sizes = host
            .engine()
            .ratios()
            .map(|ratio| format!("{}: {}", ratio, host.size_for(ratio).unwrap_or_default()))
            .collect::<Vec<_>>()
            .join(", ");
        info!(
            "{}: footprint {}/{} PEs, vCluster sizes [{}]",
            host.name,
            host.footprint(),
            host.working_pes_number(),
            sizes
        );
    }

    if let Some(path) = args.trace {
        if let Err(e) = datacenter.trace_log().save_csv(&path) {
            eprintln!("can't save trace to {}: {}", path, e);
            std::process::exit(1);
        }
        info!("placement trace saved to {}", path);
    }
}

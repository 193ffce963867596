use dslab_vcluster::config::{CatalogConfig, DatacenterConfig};
use dslab_vcluster::datacenter::Datacenter;
use dslab_vcluster::error::{AllocationError, ConfigError};
use dslab_vcluster::pe::uniform_pes;
use dslab_vcluster::trace::{HostVerdict, SelectionReason};
use dslab_vcluster::vm::{Oversubscribable, VirtualMachine, VmStatus};
use dslab_vcluster::vm_allocation_policies::first_fit::FirstFit;

fn name_wrapper(file_name: &str) -> String {
    format!("test-configs/{}", file_name)
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn datacenter_from_file(file_name: &str) -> Datacenter {
    let config = DatacenterConfig::from_file(&name_wrapper(file_name)).unwrap();
    Datacenter::from_config(&config).unwrap()
}

#[test]
fn test_config_defaults() {
    let config = DatacenterConfig::from_file(&name_wrapper("config.yaml")).unwrap();
    assert_eq!(config.placement_policy, "ClusterAware");
    assert_eq!(config.hosts.len(), 2);
    assert_eq!(config.hosts[0].count, 2);
    assert_eq!(config.hosts[0].pe_mips, 2000.);
    assert_eq!(config.hosts[0].catalog, CatalogConfig::new(vec![1.0, 2.0], 2));
    assert_eq!(config.hosts[1].catalog, CatalogConfig::default());
    assert_eq!(config.hosts[1].pe_mips, 1000.);
    assert_eq!(
        config.hosts[0].host_names().unwrap(),
        vec!["h1".to_string(), "h2".to_string()]
    );

    let datacenter = Datacenter::from_config(&config).unwrap();
    assert_eq!(datacenter.hosts().len(), 3);
    assert_eq!(datacenter.host_by_name("h2").unwrap().id, 1);
    assert_eq!(datacenter.host_by_name("small").unwrap().working_pes_number(), 4);
    assert_eq!(datacenter.host(0).unwrap().pes()[0].mips, 2000.);
}

#[test]
fn test_invalid_configs() {
    assert!(matches!(
        DatacenterConfig::from_file(&name_wrapper("missing.yaml")),
        Err(ConfigError::Io { .. })
    ));
    assert!(matches!(
        DatacenterConfig::from_yaml("hosts: [{name: h, pes: 4, oversubscription_ratios: [0.5]}]"),
        Err(ConfigError::InvalidRatio(_))
    ));
    assert!(matches!(
        DatacenterConfig::from_yaml("hosts: [{name: h, pes: 4, critical_mass: 0}]"),
        Err(ConfigError::InvalidCriticalMass(0))
    ));
    assert!(matches!(
        DatacenterConfig::from_yaml("hosts: [{name: h, pes: 0}]"),
        Err(ConfigError::InvalidHost(_))
    ));
    for pe_mips in ["0", "-1000", ".nan", ".inf"] {
        assert!(matches!(
            DatacenterConfig::from_yaml(&format!("hosts: [{{name: h, pes: 4, pe_mips: {}}}]", pe_mips)),
            Err(ConfigError::InvalidHost(_))
        ));
    }
    assert!(matches!(
        DatacenterConfig::from_yaml("hosts: [{pes: 4"),
        Err(ConfigError::Parse(_))
    ));

    let config = DatacenterConfig::from_yaml("hosts: [{name: h, pes: 4, count: 2}]").unwrap();
    assert!(matches!(
        Datacenter::from_config(&config),
        Err(ConfigError::InvalidHost(_))
    ));
    let config = DatacenterConfig::from_yaml("placement_policy: RoundRobin").unwrap();
    assert!(matches!(
        Datacenter::from_config(&config),
        Err(ConfigError::UnknownPolicy(_))
    ));
}

#[test]
// Hosts h1 and h2 have 8 PEs and critical mass 2, host small does not support ratio 2.
// The second VM goes to the empty h2 which has more availability,
// the third one returns to h1 as both hosts become equally available.
fn test_place_and_release() {
    init_logger();
    let mut datacenter = datacenter_from_file("config.yaml");
    for id in 1..=3 {
        datacenter.add_vm(VirtualMachine::new(id, 4, 1000., 2.0)).unwrap();
    }
    datacenter.add_vm(VirtualMachine::new(4, 2, 1000., 1.0)).unwrap();

    assert_eq!(datacenter.place_vm(1), Ok(0));
    assert_eq!(datacenter.place_vm(2), Ok(1));
    assert_eq!(datacenter.place_vm(3), Ok(0));
    assert_eq!(datacenter.place_vm(4), Ok(0));

    let traces = datacenter.trace_log().traces();
    assert_eq!(traces.len(), 4);
    assert_eq!(traces[0].evaluations[2].verdict, HostVerdict::UnknownRatio);
    assert_eq!(traces[1].selected_host(), Some(1));

    let h1 = datacenter.host(0).unwrap();
    assert_eq!(h1.size_for(2.0), Some(8));
    assert_eq!(h1.size_for(1.0), Some(2));
    assert_eq!(h1.footprint(), 6);
    assert_eq!(datacenter.vm(3).unwrap().status(), VmStatus::Running);
    assert_eq!(datacenter.vm(3).unwrap().allocated_mips().total_mips(), 4000.);

    // h1 keeps the footprint: the remaining VM with ratio 2 is below the critical mass
    assert_eq!(datacenter.release_vm(1), Ok(0));
    assert_eq!(datacenter.host(0).unwrap().size_for(2.0), Some(4));
    assert_eq!(datacenter.host(0).unwrap().footprint(), 6);
    assert_eq!(datacenter.vm(1).unwrap().status(), VmStatus::Finished);
    assert_eq!(datacenter.vm_location(1), None);
    assert!(datacenter.vm(1).unwrap().allocated_mips().is_empty());

    assert_eq!(
        datacenter.release_vm(1),
        Err(AllocationError::InvalidVmStatus {
            vm_id: 1,
            status: VmStatus::Finished
        })
    );
    assert_eq!(
        datacenter.place_vm(2),
        Err(AllocationError::InvalidVmStatus {
            vm_id: 2,
            status: VmStatus::Running
        })
    );

    assert_eq!(datacenter.remove_finished_vms(), 1);
    assert!(datacenter.vm(1).is_none());
    assert_eq!(datacenter.vms().count(), 3);
    assert_eq!(datacenter.remove_finished_vms(), 0);
    assert_eq!(datacenter.release_vm(1), Err(AllocationError::VmNotFound(1)));
}

#[test]
fn test_vm_registration_errors() {
    let mut datacenter = datacenter_from_file("config.yaml");
    datacenter.add_vm(VirtualMachine::new(1, 1, 1000., 1.0)).unwrap();
    assert_eq!(
        datacenter.add_vm(VirtualMachine::new(1, 2, 1000., 1.0)),
        Err(AllocationError::VmAlreadyExists(1))
    );
    assert_eq!(datacenter.place_vm(2), Err(AllocationError::VmNotFound(2)));
    assert_eq!(datacenter.release_vm(2), Err(AllocationError::VmNotFound(2)));
    assert_eq!(
        datacenter.release_vm(1),
        Err(AllocationError::InvalidVmStatus {
            vm_id: 1,
            status: VmStatus::Pending
        })
    );
    assert_eq!(datacenter.set_host_active(10, false), Err(AllocationError::HostNotFound(10)));
}

#[test]
fn test_failed_placement_can_be_retried() {
    init_logger();
    let mut datacenter = datacenter_from_file("config_first_fit.yaml");
    datacenter.add_vm(VirtualMachine::new(1, 3, 1000., 1.0)).unwrap();
    datacenter.add_vm(VirtualMachine::new(2, 2, 1000., 1.0)).unwrap();
    datacenter.add_vm(VirtualMachine::new(3, 1, 1000., 5.0)).unwrap();

    assert_eq!(datacenter.place_vm(1), Ok(0));
    assert_eq!(
        datacenter.place_vm(2),
        Err(AllocationError::PlacementExhausted { vm_id: 2 })
    );
    assert_eq!(datacenter.vm(2).unwrap().status(), VmStatus::FailedToAllocate);
    assert_eq!(
        datacenter.place_vm(3),
        Err(AllocationError::RatioNotServed { vm_id: 3, ratio: 5.0 })
    );

    datacenter.release_vm(1).unwrap();
    assert_eq!(datacenter.place_vm(2), Ok(0));
    assert_eq!(datacenter.vm(2).unwrap().status(), VmStatus::Running);
    assert_eq!(datacenter.trace_log().len(), 4);
}

#[test]
fn test_inactive_hosts_and_failed_pes() {
    let mut datacenter = datacenter_from_file("config.yaml");
    datacenter.set_host_active(0, false).unwrap();
    datacenter.add_vm(VirtualMachine::new(1, 8, 1000., 1.0)).unwrap();
    assert_eq!(datacenter.place_vm(1), Ok(1));

    datacenter.set_host_active(0, true).unwrap();
    assert_eq!(datacenter.set_pe_failed(0, 0, true), Ok(true));
    assert_eq!(datacenter.set_pe_failed(0, 42, true), Ok(false));
    datacenter.add_vm(VirtualMachine::new(2, 8, 1000., 1.0)).unwrap();
    assert_eq!(
        datacenter.place_vm(2),
        Err(AllocationError::PlacementExhausted { vm_id: 2 })
    );
    let trace = datacenter.trace_log().traces().last().unwrap();
    assert_eq!(
        trace.evaluations[0].verdict,
        HostVerdict::Unsuitable {
            footprint: 8,
            capacity: 7
        }
    );
}

#[test]
fn test_migration() {
    init_logger();
    let mut datacenter = Datacenter::new(Box::new(FirstFit::new()));
    let catalog = CatalogConfig::new(vec![1.0], 1).with_migration_overhead(0.25);
    for name in ["h0", "h1", "h2"] {
        datacenter.add_host(name, uniform_pes(4, 1000.), &catalog).unwrap();
    }
    datacenter.add_vm(VirtualMachine::new(1, 2, 1000., 1.0)).unwrap();
    datacenter.add_vm(VirtualMachine::new(2, 4, 1000., 1.0)).unwrap();
    assert_eq!(datacenter.place_vm(1), Ok(0));
    assert_eq!(datacenter.place_vm(2), Ok(1));

    // target is full
    assert_eq!(
        datacenter.migrate_vm(1, 1),
        Err(AllocationError::AdmissionRejected {
            vm_id: 1,
            host_id: 1,
            footprint: 6,
            capacity: 4
        })
    );
    assert_eq!(datacenter.vm_location(1), Some(0));
    assert!(!datacenter.vm(1).unwrap().is_in_migration());
    assert_eq!(datacenter.vm(1).unwrap().allocated_mips().total_mips(), 2000.);
    assert_eq!(
        datacenter.migrate_vm(1, 0),
        Err(AllocationError::AlreadyAllocated { vm_id: 1, host_id: 0 })
    );
    datacenter.set_host_active(2, false).unwrap();
    assert_eq!(datacenter.migrate_vm(1, 2), Err(AllocationError::HostInactive(2)));
    datacenter.set_host_active(2, true).unwrap();

    datacenter.migrate_vm(1, 2).unwrap();
    let vm = datacenter.vm(1).unwrap();
    assert_eq!(vm.status(), VmStatus::Migrating);
    assert_eq!(vm.allocated_mips().mips(), &[750., 750.]);
    assert_eq!(datacenter.vm_location(1), Some(2));
    assert_eq!(datacenter.host(0).unwrap().footprint(), 0);
    assert_eq!(datacenter.host(2).unwrap().footprint(), 2);
    assert!(matches!(
        datacenter.migrate_vm(1, 0),
        Err(AllocationError::InvalidVmStatus { .. })
    ));

    datacenter.finish_migration(1).unwrap();
    let vm = datacenter.vm(1).unwrap();
    assert_eq!(vm.status(), VmStatus::Running);
    assert!(!vm.is_in_migration());
    assert_eq!(vm.allocated_mips().mips(), &[1000., 1000.]);
    assert!(matches!(
        datacenter.finish_migration(1),
        Err(AllocationError::InvalidVmStatus { .. })
    ));
}

#[test]
fn test_find_host_does_not_allocate() {
    let mut datacenter = datacenter_from_file("config.yaml");
    datacenter.add_vm(VirtualMachine::new(1, 2, 1000., 2.0)).unwrap();
    let trace = datacenter.find_host_for_vm(1).unwrap();
    assert_eq!(trace.selected_host(), Some(0));
    assert!(datacenter.trace_log().is_empty());
    assert_eq!(datacenter.vm_location(1), None);
    assert_eq!(datacenter.host(0).unwrap().footprint(), 0);
}

#[test]
fn test_save_trace() {
    let mut datacenter = datacenter_from_file("config.yaml");
    datacenter.add_vm(VirtualMachine::new(1, 2, 1000., 2.0)).unwrap();
    datacenter.add_vm(VirtualMachine::new(2, 64, 1000., 1.0)).unwrap();
    datacenter.place_vm(1).unwrap();
    assert!(datacenter.place_vm(2).is_err());
    assert_eq!(
        datacenter.trace_log().traces()[0].decision,
        dslab_vcluster::trace::PlacementDecision::Selected {
            host_id: 0,
            reason: SelectionReason::Availability
        }
    );

    let dir = tempfile::tempdir().unwrap();
    let dir = dir.path();
    let csv_path = dir.join("dslab_vcluster_trace.csv");
    let json_path = dir.join("dslab_vcluster_trace.json");
    datacenter.trace_log().save_csv(csv_path.to_str().unwrap()).unwrap();
    datacenter.trace_log().save_json(json_path.to_str().unwrap()).unwrap();

    let csv = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines[0],
        "vm_id,vm_pes,ratio,host_id,verdict,footprint,capacity,availability,size,selected,reason"
    );
    // three hosts evaluated for each VM
    assert_eq!(lines.len(), 7);
    assert!(lines[1].starts_with("1,2,2.0,0,candidate,"));
    assert!(lines[1].ends_with(",true,availability"));

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 2);
    assert_eq!(json[1]["decision"], "no_placement");
    assert_eq!(json[0]["evaluations"][2]["verdict"], "unknown_ratio");

    datacenter.trace_log_mut().clear();
    assert!(datacenter.trace_log().is_empty());
}

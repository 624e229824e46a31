//! Network adapter save, destroy and reload against a scripted remote side.

use hvmodel_core::test_util::{MockInvoker, record};
use hvmodel_core::{Error, NetworkAdapter, NetworkAdapterAttrs, VlanMode};
use serde_json::{Value, json};

const ADD: &str = "add_vm_network_adapter";
const SET: &str = "set_vm_network_adapter";
const CONNECT: &str = "connect_vm_network_adapter";
const DISCONNECT: &str = "disconnect_vm_network_adapter";
const GET: &str = "get_vm_network_adapter";
const GET_VLAN: &str = "get_vm_network_adapter_vlan";
const SET_VLAN: &str = "set_vm_network_adapter_vlan";

fn remote_adapter() -> Value {
    json!({
        "id": "Microsoft:A1",
        "name": "eth0",
        "computer_name": "H1",
        "vm_name": "VM1",
        "switch_name": "SwitchA",
        "mac_address": "00155D000001",
        "dynamic_mac_address_enabled": false,
        "is_legacy": false,
        "ip_addresses": ""
    })
}

fn persisted(mock: &MockInvoker) -> NetworkAdapter {
    mock.service("H1")
        .network_adapters()
        .load(record(remote_adapter()))
        .unwrap()
}

fn with(base: Value, changes: Value) -> Value {
    let mut merged = record(base);
    merged.extend(record(changes));
    Value::Object(merged)
}

#[tokio::test]
async fn create_issues_single_add_call() {
    let mock = MockInvoker::new();
    mock.reply(
        ADD,
        json!({
            "id": "Microsoft:A9",
            "name": "eth0",
            "computer_name": "H1",
            "vm_name": "VM1",
            "dynamic_mac_address_enabled": true,
            "mac_address": "00155D000009",
            "switch_name": null
        }),
    );
    let mut adapter = mock.service("H1").network_adapters().new(NetworkAdapterAttrs {
        name: Some("eth0".into()),
        computer_name: Some("H1".into()),
        vm_name: Some("VM1".into()),
        dynamic_mac_address_enabled: Some(true),
        ..Default::default()
    });

    adapter.save().await.unwrap();

    let calls = mock.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].operation, ADD);
    let params = &calls[0].params;
    assert_eq!(params.get_str("name"), Some("eth0"));
    assert_eq!(params.get_str("computer_name"), Some("H1"));
    assert_eq!(params.get_str("vm_name"), Some("VM1"));
    assert_eq!(params.get("passthru"), Some(&json!(true)));
    assert_eq!(params.get("dynamic_mac_address"), Some(&json!(true)));
    assert_eq!(params.get("is_legacy"), Some(&json!(false)));
    assert!(!params.contains("static_mac_address"));
    assert!(!params.contains("switch_name"));

    assert!(adapter.is_persisted());
    assert_eq!(adapter.identity(), Some("Microsoft:A9"));
    assert_eq!(
        adapter.attributes().mac_address.as_deref(),
        Some("00155D000009")
    );
    assert!(adapter.dirty().is_empty());
    assert_eq!(
        adapter.snapshot().unwrap().attributes(),
        adapter.attributes()
    );
}

#[tokio::test]
async fn create_with_static_mac_sends_it() {
    let mock = MockInvoker::new();
    mock.reply(ADD, remote_adapter());
    let mut adapter = mock.service("H1").network_adapters().new(NetworkAdapterAttrs {
        vm_name: Some("VM1".into()),
        dynamic_mac_address_enabled: Some(false),
        mac_address: Some("00155D000001".into()),
        switch_name: Some("SwitchA".into()),
        ..Default::default()
    });

    adapter.save().await.unwrap();

    let params = &mock.calls_to(ADD)[0];
    // Name and host come from the schema default and the collection scope.
    assert_eq!(params.get_str("name"), Some("Network Adapter"));
    assert_eq!(params.get_str("computer_name"), Some("H1"));
    assert_eq!(params.get_str("static_mac_address"), Some("00155D000001"));
    assert_eq!(params.get_str("switch_name"), Some("SwitchA"));
}

#[tokio::test]
async fn update_sends_only_changed_mac() {
    let mock = MockInvoker::new();
    mock.reply(
        SET,
        with(remote_adapter(), json!({"mac_address": "00:11:22:33:44:55"})),
    );
    let mut adapter = persisted(&mock);
    {
        let a = adapter.attributes_mut();
        a.dynamic_mac_address_enabled = Some(false);
        a.mac_address = Some("00:11:22:33:44:55".into());
    }
    assert_eq!(adapter.dirty().into_iter().collect::<Vec<_>>(), vec!["mac_address"]);

    adapter.save().await.unwrap();

    assert_eq!(mock.operations(), vec![SET]);
    let params = &mock.calls_to(SET)[0];
    assert_eq!(params.get_str("name"), Some("eth0"));
    assert_eq!(params.get_str("vm_name"), Some("VM1"));
    assert_eq!(params.get_str("computer_name"), Some("H1"));
    assert_eq!(params.get_str("static_mac_address"), Some("00:11:22:33:44:55"));
    assert!(!params.contains("dynamic_mac_address"));
    assert!(!params.contains("switch_name"));
    assert!(adapter.dirty().is_empty());
}

#[tokio::test]
async fn disabling_dynamic_mac_resends_recorded_mac() {
    let mock = MockInvoker::new();
    let dynamic = with(remote_adapter(), json!({"dynamic_mac_address_enabled": true}));
    mock.reply(SET, remote_adapter());
    let mut adapter = mock
        .service("H1")
        .network_adapters()
        .load(record(dynamic))
        .unwrap();
    adapter.attributes_mut().dynamic_mac_address_enabled = Some(false);

    adapter.save().await.unwrap();

    let params = &mock.calls_to(SET)[0];
    assert_eq!(params.get("dynamic_mac_address"), Some(&json!(false)));
    assert_eq!(params.get_str("static_mac_address"), Some("00155D000001"));
}

#[tokio::test]
async fn switch_change_connects_using_updated_address() {
    let mock = MockInvoker::new();
    mock.reply(SET, with(remote_adapter(), json!({"name": "eth1"})))
        .reply(CONNECT, json!({"name": "eth1", "switch_name": "SomethingElse"}));
    let mut adapter = persisted(&mock);
    {
        let a = adapter.attributes_mut();
        a.name = Some("eth1".into());
        a.switch_name = Some("SwitchB".into());
    }

    adapter.save().await.unwrap();

    assert_eq!(mock.operations(), vec![SET, CONNECT]);
    let set = &mock.calls_to(SET)[0];
    assert_eq!(set.get_str("name"), Some("eth0"));
    assert!(!set.contains("switch_name"));

    let connect = &mock.calls_to(CONNECT)[0];
    assert_eq!(connect.get_str("name"), Some("eth1"));
    assert_eq!(connect.get_str("vm_name"), Some("VM1"));
    assert_eq!(connect.get_str("computer_name"), Some("H1"));
    assert_eq!(connect.get_str("switch_name"), Some("SwitchB"));

    assert_eq!(adapter.attributes().switch_name.as_deref(), Some("SwitchB"));
    assert_eq!(adapter.attributes().name.as_deref(), Some("eth1"));
    assert!(adapter.dirty().is_empty());
}

#[tokio::test]
async fn clearing_switch_disconnects() {
    let mock = MockInvoker::new();
    mock.reply(SET, remote_adapter());
    let mut adapter = persisted(&mock);
    adapter.attributes_mut().switch_name = None;

    adapter.save().await.unwrap();

    assert_eq!(mock.operations(), vec![SET, DISCONNECT]);
    let disconnect = &mock.calls_to(DISCONNECT)[0];
    assert!(!disconnect.contains("switch_name"));
    assert_eq!(disconnect.get_str("name"), Some("eth0"));
    assert_eq!(adapter.attributes().switch_name, None);
    assert!(adapter.dirty().is_empty());
}

#[tokio::test]
async fn missing_vm_name_fails_without_remote_calls() {
    let mock = MockInvoker::new();
    let mut adapter = mock.service("H1").network_adapters().new(NetworkAdapterAttrs {
        name: Some("eth0".into()),
        ..Default::default()
    });

    let err = adapter.save().await.unwrap_err();

    assert!(matches!(
        err,
        Error::Precondition { ref missing, .. } if missing == &vec!["vm_name"]
    ));
    assert!(mock.calls().is_empty());
    assert!(!adapter.is_persisted());
}

#[tokio::test]
async fn multi_row_reply_selects_known_identity() {
    let mock = MockInvoker::new();
    mock.reply(
        SET,
        json!([
            with(remote_adapter(), json!({"mac_address": "00155D0000AA"})),
            with(
                remote_adapter(),
                json!({"id": "Microsoft:A2", "mac_address": "00155D0000BB"})
            ),
        ]),
    );
    let mut adapter = persisted(&mock);
    adapter.attributes_mut().mac_address = Some("00155D0000AA".into());

    adapter.save().await.unwrap();

    assert_eq!(adapter.identity(), Some("Microsoft:A1"));
    assert_eq!(
        adapter.attributes().mac_address.as_deref(),
        Some("00155D0000AA")
    );
}

#[tokio::test]
async fn remote_failure_leaves_entity_untouched() {
    let mock = MockInvoker::new();
    mock.fail(SET, 1, "adapter is locked");
    let mut adapter = persisted(&mock);
    adapter.attributes_mut().mac_address = Some("00155D0000AA".into());

    let err = adapter.save().await.unwrap_err();

    assert!(matches!(err, Error::RemoteOperation { code: 1, .. }));
    assert!(adapter.changed("mac_address"));
    assert_eq!(
        adapter.snapshot().unwrap().attributes().mac_address.as_deref(),
        Some("00155D000001")
    );
}

#[tokio::test]
async fn new_adapter_saves_fresh_vlan_setting_afterwards() {
    let mock = MockInvoker::new();
    mock.reply(ADD, remote_adapter())
        .reply(SET_VLAN, json!({"operation_mode": "Access", "access_vlan_id": 10}));
    let mut adapter = mock.service("H1").network_adapters().new(NetworkAdapterAttrs {
        name: Some("eth0".into()),
        vm_name: Some("VM1".into()),
        ..Default::default()
    });

    adapter.vlan_setting().await.unwrap().set_access(10);
    assert!(mock.calls().is_empty());

    adapter.save().await.unwrap();

    assert_eq!(mock.operations(), vec![ADD, SET_VLAN]);
    let params = &mock.calls_to(SET_VLAN)[0];
    assert_eq!(params.get_str("computer_name"), Some("H1"));
    assert_eq!(params.get_str("vm_name"), Some("VM1"));
    assert_eq!(params.get_str("vm_network_adapter_name"), Some("eth0"));
    assert_eq!(params.get("access"), Some(&json!(true)));
    assert_eq!(params.get("vlan_id"), Some(&json!(10)));

    let vlan = adapter.vlan_setting().await.unwrap();
    assert!(vlan.is_persisted());
    assert!(!vlan.is_dirty());
    assert_eq!(vlan.mode(), VlanMode::Access);
}

#[tokio::test]
async fn persisted_adapter_saves_vlan_only_when_dirty() {
    let mock = MockInvoker::new();
    mock.reply(GET_VLAN, json!({"operation_mode": 0}))
        .reply(SET, remote_adapter())
        .reply(SET, remote_adapter())
        .reply(
            SET_VLAN,
            json!({"operation_mode": 2, "native_vlan_id": 1, "allowed_vlan_id_list": "1-100"}),
        );
    let mut adapter = persisted(&mock);

    let vlan = adapter.vlan_setting().await.unwrap();
    assert_eq!(vlan.mode(), VlanMode::Untagged);
    assert!(!vlan.is_dirty());
    let get = &mock.calls_to(GET_VLAN)[0];
    assert_eq!(get.get_str("vm_network_adapter_name"), Some("eth0"));

    adapter.save().await.unwrap();
    assert_eq!(mock.operations(), vec![GET_VLAN, SET]);

    adapter.vlan_setting().await.unwrap().set_trunk(1, "1-100");
    adapter.save().await.unwrap();
    assert_eq!(mock.operations(), vec![GET_VLAN, SET, SET, SET_VLAN]);

    let trunk = &mock.calls_to(SET_VLAN)[0];
    assert_eq!(trunk.get("trunk"), Some(&json!(true)));
    assert_eq!(trunk.get("native_vlan_id"), Some(&json!(1)));
    assert_eq!(trunk.get_str("allowed_vlan_id_list"), Some("1-100"));
    assert_eq!(adapter.vlan_setting().await.unwrap().mode(), VlanMode::Trunk);
}

#[tokio::test]
async fn vlan_failure_leaves_adapter_persisted() {
    let mock = MockInvoker::new();
    mock.reply(ADD, remote_adapter())
        .fail(SET_VLAN, 5, "VLAN id out of range");
    let mut adapter = mock.service("H1").network_adapters().new(NetworkAdapterAttrs {
        name: Some("eth0".into()),
        vm_name: Some("VM1".into()),
        ..Default::default()
    });
    adapter.vlan_setting().await.unwrap().set_access(4095);

    let err = adapter.save().await.unwrap_err();

    assert!(matches!(err, Error::RemoteOperation { code: 5, .. }));
    assert!(adapter.is_persisted());
    assert!(adapter.dirty().is_empty());
    assert_eq!(adapter.identity(), Some("Microsoft:A1"));
    assert!(!adapter.vlan_setting().await.unwrap().is_persisted());
}

#[tokio::test]
async fn failed_connect_keeps_previous_baseline() {
    let mock = MockInvoker::new();
    mock.reply(SET, with(remote_adapter(), json!({"mac_address": "00155D0000AA"})))
        .fail(CONNECT, 3, "switch not found");
    let mut adapter = persisted(&mock);
    {
        let a = adapter.attributes_mut();
        a.mac_address = Some("00155D0000AA".into());
        a.switch_name = Some("SwitchB".into());
    }

    let err = adapter.save().await.unwrap_err();

    assert!(matches!(err, Error::RemoteOperation { code: 3, .. }));
    assert_eq!(mock.operations(), vec![SET, CONNECT]);
    assert_eq!(
        adapter.dirty().into_iter().collect::<Vec<_>>(),
        vec!["mac_address", "switch_name"]
    );
    let baseline = adapter.snapshot().unwrap().attributes();
    assert_eq!(baseline.mac_address.as_deref(), Some("00155D000001"));
    assert_eq!(baseline.switch_name.as_deref(), Some("SwitchA"));
    assert_eq!(adapter.attributes().switch_name.as_deref(), Some("SwitchB"));
}

#[tokio::test]
async fn renamed_adapter_repoints_clean_vlan_setting() {
    let mock = MockInvoker::new();
    mock.reply(GET_VLAN, json!({"operation_mode": 0}))
        .reply(SET, with(remote_adapter(), json!({"name": "eth1"})))
        .reply(SET_VLAN, json!({"operation_mode": 1, "access_vlan_id": 5}));
    let mut adapter = persisted(&mock);
    adapter.vlan_setting().await.unwrap();
    adapter.attributes_mut().name = Some("eth1".into());

    adapter.save().await.unwrap();

    assert_eq!(mock.operations(), vec![GET_VLAN, SET]);
    let vlan = adapter.vlan_setting().await.unwrap();
    assert_eq!(vlan.attributes().vm_network_adapter_name.as_deref(), Some("eth1"));
    assert!(!vlan.is_dirty());
    assert_eq!(
        vlan.interface().await.unwrap().unwrap().attributes().name.as_deref(),
        Some("eth1")
    );

    vlan.set_access(5).save().await.unwrap();
    let params = &mock.calls_to(SET_VLAN)[0];
    assert_eq!(params.get_str("vm_network_adapter_name"), Some("eth1"));
}

#[tokio::test]
async fn destroy_requires_identity() {
    let mock = MockInvoker::new();
    let adapter = mock.service("H1").network_adapters().new(NetworkAdapterAttrs {
        name: Some("eth0".into()),
        vm_name: Some("VM1".into()),
        ..Default::default()
    });
    assert!(matches!(
        adapter.destroy().await,
        Err(Error::Precondition { .. })
    ));

    let adapter = persisted(&mock);
    adapter.destroy().await.unwrap();
    let params = &mock.calls_to("remove_vm_network_adapter")[0];
    assert_eq!(params.get_str("name"), Some("eth0"));
    assert_eq!(params.get_str("vm_name"), Some("VM1"));
    assert_eq!(adapter.attributes().name.as_deref(), Some("eth0"));
}

#[tokio::test]
async fn reload_is_idempotent() {
    let mock = MockInvoker::new();
    mock.reply(GET, remote_adapter()).reply(GET, remote_adapter());
    let mut adapter = persisted(&mock);
    adapter.attributes_mut().mac_address = Some("00155D0000FF".into());

    adapter.reload().await.unwrap();
    let first = adapter.attributes().clone();
    assert!(adapter.dirty().is_empty());

    adapter.reload().await.unwrap();
    assert_eq!(adapter.attributes(), &first);
    assert_eq!(first.mac_address.as_deref(), Some("00155D000001"));
    assert_eq!(adapter.ip_addresses(), &[] as &[String]);

    let params = &mock.calls_to(GET)[0];
    assert_eq!(params.get_str("_identity"), Some("Microsoft:A1"));
    assert_eq!(params.get_str("name"), Some("eth0"));
    assert_eq!(params.get_str("vm_name"), Some("VM1"));
}

#[tokio::test]
async fn connect_and_disconnect_track_switch_locally() {
    let mock = MockInvoker::new();
    mock.reply(CONNECT, remote_adapter())
        .reply(DISCONNECT, remote_adapter());
    let mut adapter = persisted(&mock);

    adapter.connect("SwitchC").await.unwrap();
    assert_eq!(adapter.attributes().switch_name.as_deref(), Some("SwitchC"));
    assert!(adapter.dirty().is_empty());

    adapter.disconnect().await.unwrap();
    assert_eq!(adapter.attributes().switch_name, None);
    assert_eq!(mock.operations(), vec![CONNECT, DISCONNECT]);
}

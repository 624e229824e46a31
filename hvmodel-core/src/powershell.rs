//! Remote invoker running Hyper-V cmdlets through PowerShell.
//!
//! Each operation becomes one pipeline: the cmdlet with its arguments,
//! optionally narrowed by identity and projected onto the requested fields,
//! always serialised with `ConvertTo-Json`.

use async_trait::async_trait;
use convert_case::{Case, Casing};
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};
use crate::invoker::{
    IDENTITY, JSON_DEPTH, Params, RETURN_FIELDS, RemoteInvoker, Reply, is_control_key,
};

/// Runs every operation in a fresh `pwsh` process.
#[derive(Debug, Clone)]
pub struct PowerShellInvoker {
    program: String,
}

impl Default for PowerShellInvoker {
    fn default() -> Self {
        Self::new("pwsh")
    }
}

impl PowerShellInvoker {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl RemoteInvoker for PowerShellInvoker {
    async fn invoke(&self, operation: &str, params: Params) -> Result<Reply> {
        let script = script(operation, &params)?;
        debug!(program = %self.program, %script, "running PowerShell pipeline");

        let output = Command::new(&self.program)
            .args(["-NoProfile", "-NonInteractive", "-Command", &script])
            .output()
            .await
            .map_err(|e| Error::Transport(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::RemoteOperation {
                operation: cmdlet(operation),
                code: output.status.code().unwrap_or(-1),
                message: stderr.trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_reply(&stdout)
    }
}

/// `add_vm_network_adapter` -> `Add-VmNetworkAdapter`.
pub fn cmdlet(operation: &str) -> String {
    match operation.split_once('_') {
        Some((verb, noun)) => format!(
            "{}-{}",
            verb.to_case(Case::Pascal),
            noun.to_case(Case::Pascal)
        ),
        None => operation.to_case(Case::Pascal),
    }
}

/// Builds the pipeline for one operation.
pub fn script(operation: &str, params: &Params) -> Result<String> {
    let mut script = cmdlet(operation);
    for (key, value) in params.iter() {
        if is_control_key(key) {
            continue;
        }
        let flag = key.to_case(Case::Pascal);
        match value {
            Value::Null => {}
            Value::Bool(true) => script.push_str(&format!(" -{flag}")),
            Value::Bool(false) => script.push_str(&format!(" -{flag}:$false")),
            other => {
                let literal = literal(key, other)?;
                script.push_str(&format!(" -{flag} {literal}"));
            }
        }
    }

    if let Some(identity) = params.get(IDENTITY).filter(|v| !v.is_null()) {
        let identity = literal(IDENTITY, identity)?;
        script.push_str(&format!(" | Where-Object {{ $_.Id -eq {identity} }}"));
    }

    if let Some(Value::Array(fields)) = params.get(RETURN_FIELDS) {
        let fields: Vec<String> = fields
            .iter()
            .filter_map(Value::as_str)
            .map(|field| field.to_case(Case::Pascal))
            .collect();
        if !fields.is_empty() {
            script.push_str(&format!(" | Select-Object {}", fields.join(",")));
        }
    }

    let depth = params
        .get(JSON_DEPTH)
        .and_then(Value::as_u64)
        .unwrap_or(1);
    script.push_str(&format!(" | ConvertTo-Json -Depth {depth} -Compress"));
    Ok(script)
}

/// PowerShell literal for one argument value.
fn literal(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok("$null".to_string()),
        Value::Bool(true) => Ok("$true".to_string()),
        Value::Bool(false) => Ok("$false".to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
        Value::Array(items) => {
            let items = items
                .iter()
                .map(|item| literal(key, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(format!("@({})", items.join(",")))
        }
        Value::Object(_) => Err(Error::Transport(format!(
            "argument {key} cannot be passed as an object"
        ))),
    }
}

/// Decodes `ConvertTo-Json` output into a reply with snake_case keys.
pub fn parse_reply(stdout: &str) -> Result<Reply> {
    let stdout = stdout.trim();
    if stdout.is_empty() {
        return Ok(Reply::Many(Vec::new()));
    }
    let value: Value = serde_json::from_str(stdout)?;
    Reply::from_value(snake_keys(value))
}

fn snake_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key.to_case(Case::Snake), snake_keys(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(snake_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_names_map_to_cmdlets() {
        assert_eq!(cmdlet("add_vm_network_adapter"), "Add-VmNetworkAdapter");
        assert_eq!(cmdlet("get_vm"), "Get-Vm");
        assert_eq!(cmdlet("get_vm_host"), "Get-VmHost");
    }

    #[test]
    fn script_renders_arguments() {
        let params = Params::new()
            .with("computer_name", "H1")
            .with("vm_name", "O'Brien")
            .with("passthru", true)
            .with("dynamic_mac_address", false)
            .with("is_legacy", false)
            .with("controller_number", 2)
            .with("switch_name", Value::Null);
        let script = script("add_vm_network_adapter", &params).unwrap();
        assert_eq!(
            script,
            "Add-VmNetworkAdapter -ComputerName 'H1' -VmName 'O''Brien' -Passthru \
             -DynamicMacAddress:$false -IsLegacy:$false -ControllerNumber 2 \
             | ConvertTo-Json -Depth 1 -Compress"
        );
    }

    #[test]
    fn script_applies_control_keys() {
        let params = Params::new()
            .with("name", "eth0")
            .with(RETURN_FIELDS, json!(["id", "mac_address"]))
            .with(JSON_DEPTH, 3)
            .with(IDENTITY, "Microsoft:ABC");
        let script = script("get_vm_network_adapter", &params).unwrap();
        assert_eq!(
            script,
            "Get-VmNetworkAdapter -Name 'eth0' \
             | Where-Object { $_.Id -eq 'Microsoft:ABC' } \
             | Select-Object Id,MacAddress \
             | ConvertTo-Json -Depth 3 -Compress"
        );
    }

    #[test]
    fn script_renders_lists_and_rejects_objects() {
        let params = Params::new().with("allowed", json!(["a", 1]));
        let script = script("set_thing", &params).unwrap();
        assert!(script.starts_with("Set-Thing -Allowed @('a',1)"));

        let nested = Params::new().with("settings", json!({"a": 1}));
        assert!(matches!(
            super::script("set_thing", &nested),
            Err(Error::Transport(_))
        ));
    }

    #[test]
    fn replies_are_snake_cased() {
        let reply = parse_reply(r#"{"VMName":"VM1","IPAddresses":["10.0.0.5"],"Id":"x"}"#).unwrap();
        let Reply::Single(record) = reply else {
            panic!("expected a single record");
        };
        assert_eq!(record.get("vm_name"), Some(&json!("VM1")));
        assert_eq!(record.get("ip_addresses"), Some(&json!(["10.0.0.5"])));
        assert_eq!(record.get("id"), Some(&json!("x")));
    }

    #[test]
    fn empty_output_is_an_empty_reply() {
        assert!(parse_reply("  \n").unwrap().is_empty());
        assert!(matches!(parse_reply("not json"), Err(Error::Transport(_))));
    }
}

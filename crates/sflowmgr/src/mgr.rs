use std::collections::BTreeMap;
use std::sync::Arc;

use orch_core::{Consumer, DrainAction, OrchAgent, ProducerTable};
use orch_schema::{FieldValues, Op, fv_get};

use crate::service::SamplingService;

pub const CFG_PORT_TABLE: &str = "PORT";
pub const STATE_PORT_TABLE: &str = "PORT_TABLE";
pub const CFG_SFLOW_TABLE: &str = "SFLOW";
pub const CFG_SFLOW_SESSION_TABLE: &str = "SFLOW_SESSION";
pub const APP_SFLOW_TABLE: &str = "SFLOW_TABLE";
pub const APP_SFLOW_SESSION_TABLE: &str = "SFLOW_SESSION_TABLE";

/// Configured speed before the port table told us anything.
const ERROR_SPEED: &str = "error";
/// Operational speed while unknown or while the link is down.
const NA_SPEED: &str = "N/A";

// ---------------------------------------------------------------------------
// SflowPortInfo
// ---------------------------------------------------------------------------

/// Per-port reconciliation state.
#[derive(Debug, Clone)]
struct SflowPortInfo {
    local_rate_cfg: bool,
    local_admin_cfg: bool,
    speed: String,
    oper_speed: String,
    rate: String,
    admin: String,
}

impl Default for SflowPortInfo {
    fn default() -> Self {
        Self {
            local_rate_cfg: false,
            local_admin_cfg: false,
            speed: ERROR_SPEED.to_string(),
            oper_speed: NA_SPEED.to_string(),
            rate: String::new(),
            admin: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// SflowMgr
// ---------------------------------------------------------------------------

/// Per-port sampling-rate reconciler.
///
/// Consumes the configured and operational port tables plus the global and
/// per-session sampling configuration, and emits the derived global row and
/// per-port session rows. Precedence for a session row: explicit session
/// delete, then a per-port local override, then global-enable plus
/// apply-to-all, then nothing.
pub struct SflowMgr {
    ports: BTreeMap<String, SflowPortInfo>,
    /// Apply-to-all toggle; defaults to on.
    intf_all_conf: bool,
    /// Global admin toggle.
    g_enable: bool,
    app_sflow: Arc<dyn ProducerTable>,
    app_session: Arc<dyn ProducerTable>,
    service: Box<dyn SamplingService>,
}

impl SflowMgr {
    pub fn new(
        app_sflow: Arc<dyn ProducerTable>,
        app_session: Arc<dyn ProducerTable>,
        service: Box<dyn SamplingService>,
    ) -> Self {
        Self {
            ports: BTreeMap::new(),
            intf_all_conf: true,
            g_enable: false,
            app_sflow,
            app_session,
            service,
        }
    }

    // -- configured port table ----------------------------------------------

    fn update_port_info(&mut self, consumer: &mut Consumer) {
        consumer.drain(|key, op, values| {
            match op {
                Op::Set => self.port_set(key, values),
                Op::Del => self.port_del(key),
            }
            DrainAction::Consumed
        });
    }

    fn port_set(&mut self, key: &str, values: &FieldValues) {
        let new_port = !self.ports.contains_key(key);
        let new_speed = fv_get(values, "speed").unwrap_or(ERROR_SPEED).to_string();

        let info = self.ports.entry(key.to_string()).or_default();
        let rate_update = info.speed != new_speed;
        if rate_update {
            info.speed = new_speed;
        }
        let local_rate_cfg = info.local_rate_cfg;

        if self.g_enable && self.intf_all_conf {
            // A local rate override survives configured-speed changes.
            if new_port || (rate_update && !local_rate_cfg) {
                let fvs = self.global_info(key);
                self.app_session.set(key, fvs);
            }
        }
    }

    fn port_del(&mut self, key: &str) {
        if let Some(info) = self.ports.remove(key) {
            let local_cfg = info.local_rate_cfg || info.local_admin_cfg;
            if (self.intf_all_conf && self.g_enable) || local_cfg {
                self.app_session.del(key);
            }
        }
    }

    // -- operational port table ---------------------------------------------

    fn process_oper_speed(&mut self, consumer: &mut Consumer) {
        consumer.drain(|key, op, values| {
            // DEL is ignored: the config-table delete already cleared the port.
            if op == Op::Set {
                self.oper_set(key, values);
            }
            DrainAction::Consumed
        });
    }

    fn oper_set(&mut self, key: &str, values: &FieldValues) {
        let oper_up = fv_get(values, "netdev_oper_status") == Some("up");
        // A speed reported while the link is down is a stale entry.
        let oper_speed = if oper_up {
            fv_get(values, "speed").unwrap_or(NA_SPEED)
        } else {
            NA_SPEED
        };

        let Some(info) = self.ports.get_mut(key) else {
            log::error!("port {key} not found in port conf map");
            return;
        };
        let speed_change = info.oper_speed != oper_speed;
        if speed_change {
            info.oper_speed = oper_speed.to_string();
        }
        let local_rate_cfg = info.local_rate_cfg;

        if speed_change && self.g_enable && self.intf_all_conf && !local_rate_cfg {
            let rate = self.effective_rate(key);
            log::info!("default sampling rate for {key} updated to {rate}");
            self.app_session
                .set(key, vec![("sample_rate".to_string(), rate)]);
        }
    }

    // -- global sampling configuration --------------------------------------

    fn handle_sflow_table(&mut self, consumer: &mut Consumer) {
        consumer.drain(|key, op, values| {
            match op {
                Op::Set => {
                    if let Some(admin) = fv_get(values, "admin_state") {
                        let enable = admin == "up";
                        if enable != self.g_enable {
                            self.g_enable = enable;
                            self.handle_service(enable);
                            if self.intf_all_conf {
                                self.handle_session_all(enable);
                            }
                            self.handle_session_local(enable);
                        }
                    }
                    self.app_sflow.set(key, values.clone());
                }
                Op::Del => {
                    if self.g_enable {
                        self.handle_service(false);
                        self.handle_session_all(false);
                        self.handle_session_local(false);
                    }
                    self.g_enable = false;
                    self.app_sflow.del(key);
                }
            }
            DrainAction::Consumed
        });
    }

    // -- per-session configuration ------------------------------------------

    fn handle_session_table(&mut self, consumer: &mut Consumer) {
        consumer.drain(|key, op, values| {
            match (op, key) {
                (Op::Set, "all") => {
                    if let Some(admin) = fv_get(values, "admin_state") {
                        let enable = admin == "up";
                        if enable != self.intf_all_conf && self.g_enable {
                            self.handle_session_all(enable);
                        }
                        self.intf_all_conf = enable;
                    }
                }
                (Op::Set, port) => {
                    if !self.ports.contains_key(port) {
                        // Per-session config arrived before the port did.
                        return DrainAction::Retain;
                    }
                    let fvs = self.check_and_fill(port, values);
                    if self.g_enable {
                        self.app_session.set(port, fvs);
                    }
                }
                (Op::Del, "all") => {
                    if !self.intf_all_conf && self.g_enable {
                        self.handle_session_all(true);
                    }
                    self.intf_all_conf = true;
                }
                (Op::Del, port) => {
                    self.app_session.del(port);
                    let known = if let Some(info) = self.ports.get_mut(port) {
                        info.local_rate_cfg = false;
                        info.local_admin_cfg = false;
                        info.rate.clear();
                        info.admin.clear();
                        true
                    } else {
                        log::warn!("session delete for unknown port {port}");
                        false
                    };
                    // Fall back to the global session once the local
                    // override is gone.
                    if known && self.intf_all_conf {
                        let fvs = self.global_info(port);
                        self.app_session.set(port, fvs);
                    }
                }
            }
            DrainAction::Consumed
        });
    }

    /// Record which of rate/admin are locally configured and fill the
    /// missing ones from defaults.
    fn check_and_fill(&mut self, key: &str, values: &FieldValues) -> FieldValues {
        let fallback_rate = self.effective_rate(key);
        let info = self.ports.get_mut(key).expect("caller checked the port");

        let mut fvs = Vec::new();
        let mut rate_present = false;
        let mut admin_present = false;

        for (field, value) in values {
            match field.as_str() {
                "sample_rate" => {
                    rate_present = true;
                    info.rate = value.clone();
                    info.local_rate_cfg = true;
                    fvs.push((field.clone(), value.clone()));
                }
                "admin_state" => {
                    admin_present = true;
                    info.admin = value.clone();
                    info.local_admin_cfg = true;
                    fvs.push((field.clone(), value.clone()));
                }
                _ => {}
            }
        }

        if !rate_present {
            // Back to the default rate if none exists yet, or if a previous
            // local rate is being withdrawn.
            if info.rate.is_empty() || info.local_rate_cfg {
                info.rate = fallback_rate;
            }
            info.local_rate_cfg = false;
            fvs.push(("sample_rate".to_string(), info.rate.clone()));
        }

        if !admin_present {
            if info.admin.is_empty() {
                info.admin = "up".to_string();
            }
            info.local_admin_cfg = false;
            fvs.push(("admin_state".to_string(), info.admin.clone()));
        }

        fvs
    }

    // -- walks ---------------------------------------------------------------

    /// Apply or withdraw the apply-to-all session on every known port.
    fn handle_session_all(&self, enable: bool) {
        for (key, info) in &self.ports {
            if enable {
                let fvs = if info.local_rate_cfg || info.local_admin_cfg {
                    let mut fvs = Self::port_info_fvs(info);
                    // Global admin state when no local one is configured.
                    if !info.local_admin_cfg {
                        fvs.push(("admin_state".to_string(), "up".to_string()));
                    }
                    fvs
                } else {
                    self.global_info(key)
                };
                self.app_session.set(key, fvs);
            } else if !info.local_admin_cfg {
                self.app_session.del(key);
            }
        }
    }

    /// Apply or withdraw rows for ports carrying a local override.
    fn handle_session_local(&self, enable: bool) {
        for (key, info) in &self.ports {
            if info.local_admin_cfg || info.local_rate_cfg {
                if enable {
                    self.app_session.set(key, Self::port_info_fvs(info));
                } else {
                    self.app_session.del(key);
                }
            }
        }
    }

    fn handle_service(&self, enable: bool) {
        match self.service.apply(enable) {
            Ok(()) => log::info!("sampling service {}", if enable { "restarted" } else { "stopped" }),
            Err(e) => log::error!("sampling service hook failed: {e}"),
        }
    }

    // -- derived values ------------------------------------------------------

    fn global_info(&self, key: &str) -> FieldValues {
        vec![
            ("admin_state".to_string(), "up".to_string()),
            ("sample_rate".to_string(), self.effective_rate(key)),
        ]
    }

    fn port_info_fvs(info: &SflowPortInfo) -> FieldValues {
        let mut fvs = Vec::new();
        if info.local_admin_cfg {
            fvs.push(("admin_state".to_string(), info.admin.clone()));
        }
        fvs.push(("sample_rate".to_string(), info.rate.clone()));
        fvs
    }

    /// Default sampling rate: the operational speed when known, otherwise
    /// the configured speed (which may still be the error marker).
    fn effective_rate(&self, alias: &str) -> String {
        let Some(info) = self.ports.get(alias) else {
            log::error!("{alias} not found in port configuration map");
            return ERROR_SPEED.to_string();
        };
        if !info.oper_speed.is_empty() && info.oper_speed != NA_SPEED {
            info.oper_speed.clone()
        } else {
            info.speed.clone()
        }
    }
}

impl OrchAgent for SflowMgr {
    fn name(&self) -> &str {
        "sflowmgr"
    }

    fn tables(&self) -> &[&'static str] {
        &[
            CFG_PORT_TABLE,
            STATE_PORT_TABLE,
            CFG_SFLOW_TABLE,
            CFG_SFLOW_SESSION_TABLE,
        ]
    }

    fn drain(&mut self, consumer: &mut Consumer) {
        let table = consumer.table().to_string();
        match table.as_str() {
            CFG_PORT_TABLE => self.update_port_info(consumer),
            STATE_PORT_TABLE => self.process_oper_speed(consumer),
            CFG_SFLOW_TABLE => self.handle_sflow_table(consumer),
            CFG_SFLOW_SESSION_TABLE => self.handle_session_table(consumer),
            other => log::warn!("sflowmgr: unexpected table {other}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use orch_core::MemoryTable;
    use orch_core::table::TableOp;
    use orch_schema::KeyOpFieldValues;

    struct ServiceSpy {
        calls: Arc<Mutex<Vec<bool>>>,
    }

    impl SamplingService for ServiceSpy {
        fn apply(&self, enable: bool) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(enable);
            Ok(())
        }
    }

    struct Fixture {
        mgr: SflowMgr,
        app_sflow: Arc<MemoryTable>,
        session: Arc<MemoryTable>,
        service_calls: Arc<Mutex<Vec<bool>>>,
    }

    impl Fixture {
        fn new() -> Self {
            let app_sflow = Arc::new(MemoryTable::new(APP_SFLOW_TABLE));
            let session = Arc::new(MemoryTable::new(APP_SFLOW_SESSION_TABLE));
            let service_calls = Arc::new(Mutex::new(Vec::new()));
            let mgr = SflowMgr::new(
                Arc::clone(&app_sflow) as Arc<dyn ProducerTable>,
                Arc::clone(&session) as Arc<dyn ProducerTable>,
                Box::new(ServiceSpy {
                    calls: Arc::clone(&service_calls),
                }),
            );
            Self {
                mgr,
                app_sflow,
                session,
                service_calls,
            }
        }

        fn feed(&mut self, table: &'static str, record: KeyOpFieldValues) {
            let mut consumer = Consumer::new(table);
            consumer.stage(record);
            self.mgr.drain(&mut consumer);
        }

        fn enable_global(&mut self) {
            self.feed(CFG_SFLOW_TABLE, set("global", &[("admin_state", "up")]));
        }

        fn sample_rate(&self, port: &str) -> Option<String> {
            self.session.row(port).and_then(|row| row.get("sample_rate").cloned())
        }
    }

    fn set(key: &str, values: &[(&str, &str)]) -> KeyOpFieldValues {
        KeyOpFieldValues::set(
            key,
            values
                .iter()
                .map(|(f, v)| (f.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn rate_follows_oper_speed() {
        let mut fx = Fixture::new();
        fx.enable_global();
        fx.feed(CFG_PORT_TABLE, set("Ethernet0", &[("speed", "100000")]));
        assert_eq!(fx.sample_rate("Ethernet0").unwrap(), "100000");

        fx.feed(
            STATE_PORT_TABLE,
            set(
                "Ethernet0",
                &[("speed", "25000"), ("netdev_oper_status", "up")],
            ),
        );
        assert_eq!(fx.sample_rate("Ethernet0").unwrap(), "25000");

        // Link down: the reported speed is stale, fall back to configured.
        fx.feed(
            STATE_PORT_TABLE,
            set(
                "Ethernet0",
                &[("speed", "25000"), ("netdev_oper_status", "down")],
            ),
        );
        assert_eq!(fx.sample_rate("Ethernet0").unwrap(), "100000");
    }

    #[test]
    fn oper_down_forces_na_even_with_speed() {
        let mut fx = Fixture::new();
        fx.enable_global();
        fx.feed(CFG_PORT_TABLE, set("Ethernet0", &[("speed", "40000")]));
        fx.feed(
            STATE_PORT_TABLE,
            set(
                "Ethernet0",
                &[("speed", "10000"), ("netdev_oper_status", "down")],
            ),
        );
        // Oper speed must read as unknown, so the configured speed wins.
        assert_eq!(fx.sample_rate("Ethernet0").unwrap(), "40000");
    }

    #[test]
    fn local_override_wins_over_oper_updates() {
        let mut fx = Fixture::new();
        fx.enable_global();
        fx.feed(CFG_PORT_TABLE, set("Ethernet0", &[("speed", "100000")]));

        fx.feed(
            CFG_SFLOW_SESSION_TABLE,
            set("Ethernet0", &[("sample_rate", "12345")]),
        );
        assert_eq!(fx.sample_rate("Ethernet0").unwrap(), "12345");

        fx.feed(
            STATE_PORT_TABLE,
            set(
                "Ethernet0",
                &[("speed", "25000"), ("netdev_oper_status", "up")],
            ),
        );
        assert_eq!(fx.sample_rate("Ethernet0").unwrap(), "12345");

        // Configured speed changes don't touch it either.
        fx.feed(CFG_PORT_TABLE, set("Ethernet0", &[("speed", "50000")]));
        assert_eq!(fx.sample_rate("Ethernet0").unwrap(), "12345");
    }

    #[test]
    fn redelivered_port_record_writes_nothing() {
        let mut fx = Fixture::new();
        fx.enable_global();
        fx.feed(CFG_PORT_TABLE, set("Ethernet0", &[("speed", "100000")]));
        fx.session.take_journal();

        fx.feed(CFG_PORT_TABLE, set("Ethernet0", &[("speed", "100000")]));
        assert!(fx.session.take_journal().is_empty());
    }

    #[test]
    fn session_config_before_port_is_retained() {
        let mut fx = Fixture::new();
        fx.enable_global();

        let mut consumer = Consumer::new(CFG_SFLOW_SESSION_TABLE);
        consumer.stage(set("Ethernet0", &[("sample_rate", "9999")]));
        fx.mgr.drain(&mut consumer);
        assert_eq!(consumer.len(), 1, "entry must wait for the port");
        assert!(fx.sample_rate("Ethernet0").is_none());

        fx.feed(CFG_PORT_TABLE, set("Ethernet0", &[("speed", "100000")]));
        fx.mgr.drain(&mut consumer);
        assert!(consumer.is_empty());
        assert_eq!(fx.sample_rate("Ethernet0").unwrap(), "9999");
    }

    #[test]
    fn session_delete_restores_global_row() {
        let mut fx = Fixture::new();
        fx.enable_global();
        fx.feed(CFG_PORT_TABLE, set("Ethernet0", &[("speed", "100000")]));
        fx.feed(
            CFG_SFLOW_SESSION_TABLE,
            set("Ethernet0", &[("sample_rate", "12345"), ("admin_state", "down")]),
        );
        assert_eq!(fx.sample_rate("Ethernet0").unwrap(), "12345");

        fx.feed(CFG_SFLOW_SESSION_TABLE, KeyOpFieldValues::del("Ethernet0"));
        let row = fx.session.row("Ethernet0").unwrap();
        assert_eq!(row["sample_rate"], "100000");
        assert_eq!(row["admin_state"], "up");
    }

    #[test]
    fn missing_session_rate_falls_back_to_effective() {
        let mut fx = Fixture::new();
        fx.enable_global();
        fx.feed(CFG_PORT_TABLE, set("Ethernet0", &[("speed", "100000")]));
        fx.feed(
            STATE_PORT_TABLE,
            set(
                "Ethernet0",
                &[("speed", "25000"), ("netdev_oper_status", "up")],
            ),
        );

        // Only admin_state locally configured: rate defaults to oper speed.
        fx.feed(
            CFG_SFLOW_SESSION_TABLE,
            set("Ethernet0", &[("admin_state", "down")]),
        );
        let row = fx.session.row("Ethernet0").unwrap();
        assert_eq!(row["admin_state"], "down");
        assert_eq!(row["sample_rate"], "25000");
    }

    #[test]
    fn global_set_forwards_raw_row() {
        let mut fx = Fixture::new();
        fx.feed(
            CFG_SFLOW_TABLE,
            set("global", &[("admin_state", "up"), ("polling_interval", "20")]),
        );
        let row = fx.app_sflow.row("global").unwrap();
        assert_eq!(row["admin_state"], "up");
        assert_eq!(row["polling_interval"], "20");
    }

    #[test]
    fn global_delete_tears_everything_down() {
        let mut fx = Fixture::new();
        fx.enable_global();
        fx.feed(CFG_PORT_TABLE, set("Ethernet0", &[("speed", "100000")]));
        fx.feed(CFG_PORT_TABLE, set("Ethernet4", &[("speed", "40000")]));
        fx.feed(
            CFG_SFLOW_SESSION_TABLE,
            set("Ethernet4", &[("admin_state", "up")]),
        );
        assert!(fx.session.contains("Ethernet0"));
        assert!(fx.session.contains("Ethernet4"));

        fx.feed(CFG_SFLOW_TABLE, KeyOpFieldValues::del("global"));
        assert!(!fx.app_sflow.contains("global"));
        assert!(!fx.session.contains("Ethernet0"));
        assert!(!fx.session.contains("Ethernet4"));
        assert_eq!(*fx.service_calls.lock().unwrap(), [true, false]);
    }

    #[test]
    fn service_hook_fires_only_on_transitions() {
        let mut fx = Fixture::new();
        fx.enable_global();
        fx.enable_global();
        fx.feed(CFG_SFLOW_TABLE, set("global", &[("admin_state", "down")]));
        assert_eq!(*fx.service_calls.lock().unwrap(), [true, false]);
    }

    #[test]
    fn all_toggle_walks_sessions() {
        let mut fx = Fixture::new();
        fx.enable_global();
        fx.feed(CFG_PORT_TABLE, set("Ethernet0", &[("speed", "100000")]));

        fx.feed(
            CFG_SFLOW_SESSION_TABLE,
            set("all", &[("admin_state", "down")]),
        );
        assert!(!fx.session.contains("Ethernet0"));

        // New port while apply-to-all is off: no row.
        fx.feed(CFG_PORT_TABLE, set("Ethernet4", &[("speed", "40000")]));
        assert!(!fx.session.contains("Ethernet4"));

        // Deleting the `all` key resets the toggle and re-emits.
        fx.feed(CFG_SFLOW_SESSION_TABLE, KeyOpFieldValues::del("all"));
        assert_eq!(fx.sample_rate("Ethernet0").unwrap(), "100000");
        assert_eq!(fx.sample_rate("Ethernet4").unwrap(), "40000");
    }

    #[test]
    fn port_delete_cleans_owned_rows() {
        let mut fx = Fixture::new();
        fx.enable_global();
        fx.feed(CFG_PORT_TABLE, set("Ethernet0", &[("speed", "100000")]));
        assert!(fx.session.contains("Ethernet0"));

        fx.feed(CFG_PORT_TABLE, KeyOpFieldValues::del("Ethernet0"));
        assert!(!fx.session.contains("Ethernet0"));

        // A port never owned by global or local config emits no delete.
        fx.feed(CFG_SFLOW_TABLE, set("global", &[("admin_state", "down")]));
        fx.feed(CFG_PORT_TABLE, set("Ethernet8", &[("speed", "10000")]));
        fx.session.take_journal();
        fx.feed(CFG_PORT_TABLE, KeyOpFieldValues::del("Ethernet8"));
        assert_eq!(
            fx.session
                .take_journal()
                .iter()
                .filter(|op| matches!(op, TableOp::Del(_)))
                .count(),
            0
        );
    }

    #[test]
    fn oper_update_for_unknown_port_is_logged_and_dropped() {
        let mut fx = Fixture::new();
        fx.enable_global();
        let mut consumer = Consumer::new(STATE_PORT_TABLE);
        consumer.stage(set(
            "Ethernet0",
            &[("speed", "25000"), ("netdev_oper_status", "up")],
        ));
        fx.mgr.drain(&mut consumer);
        assert!(consumer.is_empty());
        assert!(fx.sample_rate("Ethernet0").is_none());
    }
}

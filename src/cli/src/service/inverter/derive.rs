use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::service::modbus::Plan;

use super::snapshot::Snapshot;

pub(crate) const RUN_STATE_ON: &str = "ON";
pub(crate) const RUN_STATE_OFF: &str = "OFF";

const CLOCK_FIELDS: [&str; 6] =
  ["year", "month", "day", "hour", "minute", "second"];

const ALARM_CLOCK_FIELDS: [&str; 6] = [
  "alarm_time_year",
  "alarm_time_month",
  "alarm_time_day",
  "alarm_time_hour",
  "alarm_time_minute",
  "alarm_time_second",
];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Metrics computed from freshly merged registers.
///
/// Steps run in a fixed order and later steps see earlier writes. Each step
/// reports whether its preconditions held; a step that does not fire leaves
/// the snapshot as it was.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Derivation<'a> {
  pub(crate) plan: &'a Plan,
  pub(crate) level: u8,
  pub(crate) use_local_time: bool,
  pub(crate) now: chrono::NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Applied {
  pub(crate) export_power: bool,
  pub(crate) grid: bool,
  pub(crate) load_power: bool,
  pub(crate) run_state: bool,
  pub(crate) timestamp: bool,
  pub(crate) alarm_timestamp: bool,
}

impl Derivation<'_> {
  pub(crate) fn apply(&self, snapshot: &mut Snapshot) -> Applied {
    let applied = Applied {
      export_power: self.export_power(snapshot),
      grid: self.grid(snapshot),
      load_power: self.load_power(snapshot),
      run_state: self.run_state(snapshot),
      timestamp: self.timestamp(snapshot),
      alarm_timestamp: self.alarm_timestamp(snapshot),
    };
    tracing::trace!("Derived {:?}", applied);
    applied
  }

  /// Hybrid inverters report export power under a different name.
  fn export_power(&self, snapshot: &mut Snapshot) -> bool {
    if self.plan.is_applicable("export_power") {
      return false;
    }

    let value = snapshot
      .get("export_power_hybrid")
      .cloned()
      .unwrap_or_else(|| Decimal::ZERO.into());
    snapshot.set("export_power", value);
    true
  }

  fn grid(&self, snapshot: &mut Snapshot) -> bool {
    if self.level < 1 {
      return false;
    }

    snapshot.set("export_to_grid", Decimal::ZERO);
    snapshot.set("import_from_grid", Decimal::ZERO);

    let power = match snapshot.get("meter_power") {
      Some(power) => Some(power),
      None => snapshot.get("export_power"),
    }
    .cloned();
    let power_is_set = power.as_ref().is_some_and(|power| power.is_truthy());

    if self.plan.is_applicable("meter_power") && power_is_set {
      // meter power is positive while importing
      if let Some(power) = power.and_then(|power| power.as_number()) {
        if power.is_sign_negative() {
          snapshot.set("export_to_grid", power.abs());
        } else {
          snapshot.set("import_from_grid", power);
        }
      }
    } else if self.plan.is_applicable("export_power_hybrid") {
      // hybrid export power is positive while exporting
      let power = match snapshot.get("export_power_hybrid") {
        Some(power) => power.as_number(),
        None => Some(Decimal::ZERO),
      };
      if let Some(power) = power {
        if power.is_sign_negative() && !power.is_zero() {
          snapshot.set("import_from_grid", power.abs());
        } else {
          snapshot.set("export_to_grid", power);
        }
      }
    }

    true
  }

  /// Derived values are recomputed every cycle unless the inverter reports
  /// its own load power.
  fn load_power(&self, snapshot: &mut Snapshot) -> bool {
    if self.plan.is_applicable("load_power")
      && snapshot.is_truthy("load_power")
    {
      return false;
    }

    let total = snapshot.number("total_active_power");
    let meter = snapshot.number("meter_power");
    if let (Some(total), Some(meter)) = (total, meter) {
      snapshot.set("load_power", total.trunc() + meter.trunc());
      return true;
    }

    match snapshot.get("load_power_hybrid").cloned() {
      Some(hybrid) if hybrid.is_truthy() => {
        snapshot.set("load_power", hybrid);
        true
      }
      _ => false,
    }
  }

  fn run_state(&self, snapshot: &mut Snapshot) -> bool {
    if !snapshot.is_truthy("start_stop") {
      snapshot.set("run_state", RUN_STATE_OFF);
      return true;
    }

    if snapshot.text("start_stop") != Some("Start") {
      snapshot.set("run_state", RUN_STATE_OFF);
      return true;
    }

    // NOTE: a started inverter without a readable work state keeps its
    // previous run state instead of falling back to OFF
    let Some(work_state) = snapshot.text("work_state_1") else {
      return false;
    };
    let run_state = if work_state.contains("Run") {
      RUN_STATE_ON
    } else {
      RUN_STATE_OFF
    };
    snapshot.set("run_state", run_state);
    true
  }

  fn timestamp(&self, snapshot: &mut Snapshot) -> bool {
    if self.use_local_time {
      let timestamp = self.now.format(TIMESTAMP_FORMAT).to_string();
      tracing::debug!("Using local time {}", timestamp);
      snapshot.set("timestamp", timestamp);
      remove_all(snapshot, &CLOCK_FIELDS);
      return true;
    }

    let Some(timestamp) = format_clock(snapshot, &CLOCK_FIELDS) else {
      return false;
    };
    tracing::debug!("Using inverter time {}", timestamp);
    snapshot.set("timestamp", timestamp);
    remove_all(snapshot, &CLOCK_FIELDS);
    true
  }

  fn alarm_timestamp(&self, snapshot: &mut Snapshot) -> bool {
    let timestamp = if snapshot.is_truthy("pid_alarm_code") {
      format_clock(snapshot, &ALARM_CLOCK_FIELDS)
    } else {
      None
    };
    remove_all(snapshot, &ALARM_CLOCK_FIELDS);

    match timestamp {
      Some(timestamp) => {
        snapshot.set("alarm_timestamp", timestamp);
        true
      }
      None => false,
    }
  }
}

/// `year-month-day hour:MM:SS` with only minutes and seconds padded.
fn format_clock(snapshot: &Snapshot, fields: &[&str; 6]) -> Option<String> {
  let [year, month, day, hour, minute, second] = fields;
  let minute = snapshot.number(minute)?.to_i64()?;
  let second = snapshot.number(second)?.to_i64()?;

  Some(format!(
    "{}-{}-{} {}:{:02}:{:02}",
    snapshot.get(year)?,
    snapshot.get(month)?,
    snapshot.get(day)?,
    snapshot.get(hour)?,
    minute,
    second
  ))
}

fn remove_all(snapshot: &mut Snapshot, fields: &[&str]) {
  for field in fields {
    snapshot.remove(field);
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use rust_decimal_macros::dec;

  use crate::service::modbus::*;

  use super::*;

  fn plan(names: &[&str]) -> Plan {
    let registers = names
      .iter()
      .enumerate()
      .map(|(index, name)| {
        RegisterDefinition::new(
          name,
          Bank::Input,
          5000 + index as u16,
          RegisterKind::S32,
        )
        .with_level(1)
      })
      .collect();
    Plan::new(
      &Catalog::new(None, registers, Vec::new()),
      &Filter {
        level: 1,
        model: None,
        smart_meter: false,
      },
    )
  }

  fn now() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 7)
      .and_then(|date| date.and_hms_opt(9, 5, 3))
      .unwrap()
  }

  fn derivation(plan: &Plan) -> Derivation<'_> {
    Derivation {
      plan,
      level: 1,
      use_local_time: false,
      now: now(),
    }
  }

  #[test]
  fn negative_meter_power_exports() {
    let plan = plan(&["export_power", "meter_power"]);
    let mut snapshot = Snapshot::new();
    snapshot.set("meter_power", -500);

    assert!(derivation(&plan).grid(&mut snapshot));

    assert_eq!(snapshot.number("export_to_grid"), Some(dec!(500)));
    assert_eq!(snapshot.number("import_from_grid"), Some(dec!(0)));
  }

  #[test]
  fn positive_meter_power_imports() {
    let plan = plan(&["export_power", "meter_power"]);
    let mut snapshot = Snapshot::new();
    snapshot.set("meter_power", 750);

    derivation(&plan).grid(&mut snapshot);

    assert_eq!(snapshot.number("export_to_grid"), Some(dec!(0)));
    assert_eq!(snapshot.number("import_from_grid"), Some(dec!(750)));
  }

  #[test]
  fn hybrid_power_sign_is_inverted() {
    let plan = plan(&["export_power_hybrid"]);
    let mut snapshot = Snapshot::new();
    snapshot.set("export_power_hybrid", -300);

    let applied = derivation(&plan).apply(&mut snapshot);

    assert!(applied.export_power);
    assert!(applied.grid);
    assert_eq!(snapshot.number("export_power"), Some(dec!(-300)));
    assert_eq!(snapshot.number("import_from_grid"), Some(dec!(300)));
    assert_eq!(snapshot.number("export_to_grid"), Some(dec!(0)));
  }

  #[test]
  fn zero_meter_power_falls_through_to_hybrid() {
    let plan = plan(&["meter_power", "export_power_hybrid"]);
    let mut snapshot = Snapshot::new();
    snapshot.set("meter_power", 0);
    snapshot.set("export_power_hybrid", 120);

    derivation(&plan).apply(&mut snapshot);

    assert_eq!(snapshot.number("export_to_grid"), Some(dec!(120)));
    assert_eq!(snapshot.number("import_from_grid"), Some(dec!(0)));
  }

  #[test]
  fn grid_split_needs_level_one() {
    let plan = plan(&["export_power", "meter_power"]);
    let mut snapshot = Snapshot::new();
    snapshot.set("meter_power", -500);

    let derivation = Derivation {
      level: 0,
      ..derivation(&plan)
    };

    assert!(!derivation.grid(&mut snapshot));
    assert!(!snapshot.contains("export_to_grid"));
  }

  #[test]
  fn export_power_alias_defaults_to_zero() {
    let plan = plan(&[]);
    let mut snapshot = Snapshot::new();

    assert!(derivation(&plan).export_power(&mut snapshot));
    assert_eq!(snapshot.number("export_power"), Some(dec!(0)));
  }

  #[test]
  fn load_power_is_computed_when_missing() {
    let plan = plan(&["export_power"]);
    let mut snapshot = Snapshot::new();
    snapshot.set("total_active_power", dec!(2000.7));
    snapshot.set("meter_power", dec!(150.2));

    assert!(derivation(&plan).load_power(&mut snapshot));
    assert_eq!(snapshot.number("load_power"), Some(dec!(2150)));
  }

  #[test]
  fn load_power_falls_back_to_hybrid() {
    let plan = plan(&["export_power"]);
    let mut snapshot = Snapshot::new();
    snapshot.set("load_power", 0);
    snapshot.set("load_power_hybrid", 640);

    assert!(derivation(&plan).load_power(&mut snapshot));
    assert_eq!(snapshot.number("load_power"), Some(dec!(640)));
  }

  #[test]
  fn derived_load_power_follows_new_readings() {
    let plan = plan(&["export_power"]);
    let mut snapshot = Snapshot::new();
    snapshot.set("total_active_power", 2000);
    snapshot.set("meter_power", 100);
    assert!(derivation(&plan).load_power(&mut snapshot));

    snapshot.set("total_active_power", 1500);
    snapshot.set("meter_power", -300);

    assert!(derivation(&plan).load_power(&mut snapshot));
    assert_eq!(snapshot.number("load_power"), Some(dec!(1200)));
  }

  #[test]
  fn reported_load_power_is_kept() {
    let plan = plan(&["export_power", "load_power"]);
    let mut snapshot = Snapshot::new();
    snapshot.set("load_power", 900);
    snapshot.set("total_active_power", 2000);
    snapshot.set("meter_power", 100);

    assert!(!derivation(&plan).load_power(&mut snapshot));
    assert_eq!(snapshot.number("load_power"), Some(dec!(900)));
  }

  #[test]
  fn run_state_follows_start_and_work_state() {
    let plan = plan(&["export_power"]);
    let derivation = derivation(&plan);
    let mut snapshot = Snapshot::new();

    snapshot.set("start_stop", "Start");
    snapshot.set("work_state_1", "Run");
    assert!(derivation.run_state(&mut snapshot));
    assert_eq!(snapshot.text("run_state"), Some(RUN_STATE_ON));

    snapshot.set("start_stop", "Stop");
    assert!(derivation.run_state(&mut snapshot));
    assert_eq!(snapshot.text("run_state"), Some(RUN_STATE_OFF));

    snapshot.remove("start_stop");
    snapshot.set("run_state", RUN_STATE_ON);
    assert!(derivation.run_state(&mut snapshot));
    assert_eq!(snapshot.text("run_state"), Some(RUN_STATE_OFF));
  }

  #[test]
  fn started_without_work_state_keeps_run_state() {
    let plan = plan(&["export_power"]);
    let mut snapshot = Snapshot::new();
    snapshot.set("run_state", RUN_STATE_ON);
    snapshot.set("start_stop", "Start");
    snapshot.set("work_state_1", 3);

    assert!(!derivation(&plan).run_state(&mut snapshot));
    assert_eq!(snapshot.text("run_state"), Some(RUN_STATE_ON));
  }

  fn set_clock(snapshot: &mut Snapshot, fields: &[&str; 6]) {
    for (field, value) in fields.iter().zip([2024, 3, 7, 9, 5, 3]) {
      snapshot.set(field, value);
    }
  }

  #[test]
  fn inverter_time_pads_minutes_and_seconds_only() {
    let plan = plan(&["export_power"]);
    let mut snapshot = Snapshot::new();
    set_clock(&mut snapshot, &CLOCK_FIELDS);

    assert!(derivation(&plan).timestamp(&mut snapshot));
    assert_eq!(snapshot.text("timestamp"), Some("2024-3-7 9:05:03"));
    assert!(CLOCK_FIELDS.iter().all(|field| !snapshot.contains(field)));
  }

  #[test]
  fn incomplete_inverter_time_changes_nothing() {
    let plan = plan(&["export_power"]);
    let mut snapshot = Snapshot::new();
    set_clock(&mut snapshot, &CLOCK_FIELDS);
    snapshot.remove("second");
    let before = snapshot.clone();

    assert!(!derivation(&plan).timestamp(&mut snapshot));
    assert_eq!(snapshot, before);
  }

  #[test]
  fn local_time_replaces_clock_fields() {
    let plan = plan(&["export_power"]);
    let derivation = Derivation {
      use_local_time: true,
      ..derivation(&plan)
    };
    let mut snapshot = Snapshot::new();
    set_clock(&mut snapshot, &CLOCK_FIELDS);
    snapshot.set("year", 1999);

    assert!(derivation.timestamp(&mut snapshot));
    assert_eq!(snapshot.text("timestamp"), Some("2024-03-07 09:05:03"));
    assert!(CLOCK_FIELDS.iter().all(|field| !snapshot.contains(field)));
  }

  #[test]
  fn alarm_fields_are_always_removed() {
    let plan = plan(&["export_power"]);
    let mut snapshot = Snapshot::new();
    set_clock(&mut snapshot, &ALARM_CLOCK_FIELDS);
    snapshot.set("pid_alarm_code", 0);

    assert!(!derivation(&plan).alarm_timestamp(&mut snapshot));
    assert!(!snapshot.contains("alarm_timestamp"));
    assert!(ALARM_CLOCK_FIELDS
      .iter()
      .all(|field| !snapshot.contains(field)));
  }

  #[test]
  fn active_alarm_gets_a_timestamp() {
    let plan = plan(&["export_power"]);
    let mut snapshot = Snapshot::new();
    set_clock(&mut snapshot, &ALARM_CLOCK_FIELDS);
    snapshot.set("pid_alarm_code", 434);

    assert!(derivation(&plan).alarm_timestamp(&mut snapshot));
    assert_eq!(snapshot.text("alarm_timestamp"), Some("2024-3-7 9:05:03"));
  }
}

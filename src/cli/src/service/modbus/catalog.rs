use super::range::{self, ScanRange};
use super::register::*;

/// Detail level at which every register is loaded regardless of model.
pub(crate) const LEVEL_ALL: u8 = 3;

pub(crate) const MODEL_REGISTER: &str = "device_type_code";

/// Metrics computed from other registers, reported alongside real ones.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VirtualRegister {
  pub(crate) name: &'static str,
  pub(crate) address: &'static str,
  pub(crate) unit: Option<&'static str>,
}

pub(crate) const VIRTUAL_REGISTERS: [VirtualRegister; 4] = [
  VirtualRegister {
    name: "export_to_grid",
    address: "vr001",
    unit: Some("W"),
  },
  VirtualRegister {
    name: "import_from_grid",
    address: "vr002",
    unit: Some("W"),
  },
  VirtualRegister {
    name: "run_state",
    address: "vr003",
    unit: None,
  },
  VirtualRegister {
    name: "timestamp",
    address: "vr004",
    unit: None,
  },
];

#[derive(Debug, Clone)]
pub(crate) struct Catalog {
  version: Option<String>,
  registers: Vec<RegisterDefinition>,
  ranges: Vec<ScanRange>,
}

impl Catalog {
  pub(crate) fn new(
    version: Option<String>,
    registers: Vec<RegisterDefinition>,
    ranges: Vec<ScanRange>,
  ) -> Self {
    Self {
      version,
      registers,
      ranges,
    }
  }

  pub(crate) fn version(&self) -> Option<&str> {
    self.version.as_deref()
  }

  pub(crate) fn registers(&self) -> &[RegisterDefinition] {
    &self.registers
  }

  pub(crate) fn ranges(&self) -> &[ScanRange] {
    &self.ranges
  }

  /// First register with this name, input bank before holding bank.
  pub(crate) fn find(&self, name: &str) -> Option<&RegisterDefinition> {
    Bank::ALL.iter().find_map(|bank| {
      self
        .registers
        .iter()
        .find(|register| register.bank == *bank && register.name == name)
    })
  }

  pub(crate) fn applicable(&self, filter: &Filter) -> Vec<RegisterDefinition> {
    self
      .registers
      .iter()
      .filter(|register| filter.applies(register))
      .cloned()
      .collect()
  }
}

/// Deployment facts that decide which registers get loaded.
#[derive(Debug, Clone, Default)]
pub(crate) struct Filter {
  pub(crate) level: u8,
  pub(crate) model: Option<String>,
  pub(crate) smart_meter: bool,
}

impl Filter {
  pub(crate) fn applies(&self, register: &RegisterDefinition) -> bool {
    if register.level > self.level && self.level != LEVEL_ALL {
      return false;
    }

    if register.smart_meter {
      return self.smart_meter;
    }

    match (&register.models, &self.model) {
      (Some(models), Some(model)) if self.level != LEVEL_ALL => {
        models.iter().any(|supported| supported == model)
      }
      _ => true,
    }
  }
}

/// Registers and ranges read on every scrape, fixed after model resolution.
#[derive(Debug, Clone)]
pub(crate) struct Plan {
  registers: Vec<RegisterDefinition>,
  ranges: Vec<ScanRange>,
}

impl Plan {
  pub(crate) fn new(catalog: &Catalog, filter: &Filter) -> Self {
    let registers = catalog.applicable(filter);
    let ranges = range::plan(&registers, catalog.ranges());

    Self { registers, ranges }
  }

  pub(crate) fn registers(&self) -> &[RegisterDefinition] {
    &self.registers
  }

  pub(crate) fn ranges(&self) -> &[ScanRange] {
    &self.ranges
  }

  pub(crate) fn is_applicable(&self, name: &str) -> bool {
    self.register(name).is_some() || self.virtual_register(name).is_some()
  }

  pub(crate) fn address(&self, name: &str) -> Option<String> {
    self
      .register(name)
      .map(|register| register.address.to_string())
      .or_else(|| {
        self
          .virtual_register(name)
          .map(|register| register.address.to_owned())
      })
  }

  pub(crate) fn unit(&self, name: &str) -> Option<&str> {
    match self.register(name) {
      Some(register) => register.unit.as_deref(),
      None => self.virtual_register(name).and_then(|register| register.unit),
    }
  }

  /// Names in reporting order: planned registers, then virtual ones.
  pub(crate) fn names(&self) -> impl Iterator<Item = &str> {
    self
      .registers
      .iter()
      .map(|register| register.name.as_str())
      .chain(VIRTUAL_REGISTERS.iter().map(|register| register.name))
  }

  fn register(&self, name: &str) -> Option<&RegisterDefinition> {
    self.registers.iter().find(|register| register.name == name)
  }

  fn virtual_register(&self, name: &str) -> Option<&'static VirtualRegister> {
    VIRTUAL_REGISTERS.iter().find(|register| register.name == name)
  }
}

pub(crate) fn probe_range(register: &RegisterDefinition) -> ScanRange {
  ScanRange {
    bank: register.bank,
    start: register.address.saturating_sub(1),
    length: 1,
  }
}

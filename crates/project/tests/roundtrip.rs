//! End-to-end project round-trip (§8 scenario 1 and the Params
//! `FromXML(ToXML(P)) == P` property), exercised against a pair of minimal
//! `Object` stand-ins — concrete hardware adapters/instruments/modules are
//! out of scope (§1), so the test builds its own library the way
//! `labcore-manager`'s own tests do.

use std::sync::Arc;

use async_trait::async_trait;
use labcore_error::Result;
use labcore_manager::ResourceManager;
use labcore_object::{
    Category, Configurator, FieldSpec, FieldValue, ItemId, Library, LibraryEntry, Object,
    ObjectBase, ObjectLinkValue, Params,
};
use labcore_project::{ProjectLibraries, ProjectManagers, load_project_from_str, save_project_to_string};

struct Widget {
    base: ObjectBase,
}

#[async_trait]
impl Object for Widget {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    async fn on_ensure_ready(&self, _is_auto_startup: bool) -> Result<()> {
        Ok(())
    }

    async fn on_reset(&self) -> Result<()> {
        Ok(())
    }
}

struct WidgetConfigurator;

impl Configurator for WidgetConfigurator {
    fn category(&self) -> Category {
        Category::HardwareAdapter
    }

    fn name(&self) -> &str {
        "Widget"
    }

    fn make_params(&self) -> Params {
        Params::new(vec![
            FieldSpec::new("line_ending", "Line ending", FieldValue::Enum("LF".into()))
                .with_allowed_values(vec!["None".into(), "NUL".into(), "LF".into(), "CRLF".into(), "CR".into()]),
            FieldSpec::new("retries", "Retries", FieldValue::Int(3)).with_bounds(0.0, 10.0),
        ])
    }
}

struct Gadget {
    base: ObjectBase,
}

#[async_trait]
impl Object for Gadget {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    async fn on_ensure_ready(&self, _is_auto_startup: bool) -> Result<()> {
        Ok(())
    }

    async fn on_reset(&self) -> Result<()> {
        Ok(())
    }
}

struct GadgetConfigurator;

impl Configurator for GadgetConfigurator {
    fn category(&self) -> Category {
        Category::Instrument
    }

    fn name(&self) -> &str {
        "Gadget"
    }

    fn make_params(&self) -> Params {
        Params::new(vec![FieldSpec::new(
            "adapter",
            "Adapter link",
            FieldValue::ObjectLink(ObjectLinkValue::default()),
        )])
    }
}

fn hardware_library() -> Library<Widget> {
    Library::new(vec![LibraryEntry {
        name: "Widget".to_string(),
        configurator: Arc::new(WidgetConfigurator),
        factory: Arc::new(|id, _params| {
            Arc::new(Widget {
                base: ObjectBase::new(id, Category::HardwareAdapter, "Widget"),
            })
        }),
    }])
}

fn instrument_library() -> Library<Gadget> {
    Library::new(vec![LibraryEntry {
        name: "Gadget".to_string(),
        configurator: Arc::new(GadgetConfigurator),
        factory: Arc::new(|id, _params| {
            Arc::new(Gadget {
                base: ObjectBase::new(id, Category::Instrument, "Gadget"),
            })
        }),
    }])
}

#[test]
fn single_hardware_adapter_round_trips_its_line_ending() {
    let hardware = ResourceManager::<Widget>::new();
    let hw_library = hardware_library();
    let entry = hw_library.find("Widget").unwrap();
    let mut params = entry.configurator.make_params();
    params.set("line_ending", FieldValue::Enum("CRLF".to_string())).unwrap();
    let id = hardware.allocate_id();
    let object = hw_library.instantiate("Widget", id, params.clone()).unwrap();
    object.base().set_object_name("Serial1");
    hardware.insert_resource(id, "Widget", Arc::new(params), object);

    let instruments = ResourceManager::<Gadget>::new();
    let instrument_library = instrument_library();

    let managers = ProjectManagers {
        hardware: &hardware,
        instruments: &instruments,
        modules: &instruments,
    };
    let xml = save_project_to_string(&managers).unwrap();
    assert!(xml.contains("CRLF"));
    assert!(xml.contains("ObjectName=\"Serial1\""));

    let fresh_hardware = ResourceManager::<Widget>::new();
    let fresh_instruments = ResourceManager::<Gadget>::new();
    let libraries = ProjectLibraries {
        hardware: &hw_library,
        instruments: &instrument_library,
        modules: &instrument_library,
    };
    let fresh_managers = ProjectManagers {
        hardware: &fresh_hardware,
        instruments: &fresh_instruments,
        modules: &fresh_instruments,
    };
    load_project_from_str(&xml, &libraries, &fresh_managers).unwrap();

    let loaded = fresh_hardware.get_resource(id).unwrap();
    assert_eq!(loaded.object_name(), "Serial1");
    let (_, _, loaded_params) = fresh_hardware
        .entries_snapshot()
        .into_iter()
        .find(|(entry_id, _, _)| *entry_id == id)
        .unwrap();
    assert_eq!(loaded_params.get("line_ending").unwrap(), FieldValue::Enum("CRLF".to_string()));
    assert_eq!(loaded_params.get("retries").unwrap(), FieldValue::Int(3));
}

#[test]
fn object_link_field_round_trips_target_ids_and_capability() {
    let instruments = ResourceManager::<Gadget>::new();
    let instrument_library = instrument_library();
    let entry = instrument_library.find("Gadget").unwrap();
    let mut params = entry.configurator.make_params();
    params
        .set(
            "adapter",
            FieldValue::ObjectLink(ObjectLinkValue::single(ItemId::new(7), Category::HardwareAdapter)),
        )
        .unwrap();
    let id = instruments.allocate_id();
    let object = instrument_library.instantiate("Gadget", id, params.clone()).unwrap();
    instruments.insert_resource(id, "Gadget", Arc::new(params), object);

    let hardware = ResourceManager::<Widget>::new();
    let hw_library = hardware_library();
    let managers = ProjectManagers {
        hardware: &hardware,
        instruments: &instruments,
        modules: &ResourceManager::<Gadget>::new(),
    };
    let xml = save_project_to_string(&managers).unwrap();

    let fresh_instruments = ResourceManager::<Gadget>::new();
    let fresh_hardware = ResourceManager::<Widget>::new();
    let libraries = ProjectLibraries {
        hardware: &hw_library,
        instruments: &instrument_library,
        modules: &instrument_library,
    };
    let fresh_managers = ProjectManagers {
        hardware: &fresh_hardware,
        instruments: &fresh_instruments,
        modules: &ResourceManager::<Gadget>::new(),
    };
    load_project_from_str(&xml, &libraries, &fresh_managers).unwrap();

    let (_, _, loaded_params) = fresh_instruments.entries_snapshot().into_iter().next().unwrap();
    let value = loaded_params.get("adapter").unwrap();
    assert_eq!(
        value,
        FieldValue::ObjectLink(ObjectLinkValue::single(ItemId::new(7), Category::HardwareAdapter))
    );
}

#[test]
fn unrecognized_field_is_discarded_not_fatal() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<Project>
  <HardwareAdapters>
    <Item Name="Widget" Category="HardwareAdapter" ID="1">
      <Params>
        <Field key="line_ending" kind="Enum">LF</Field>
        <Field key="nonexistent" kind="String">ignored</Field>
      </Params>
    </Item>
  </HardwareAdapters>
  <Instruments></Instruments>
  <Modules></Modules>
</Project>"#;

    let hardware = ResourceManager::<Widget>::new();
    let hw_library = hardware_library();
    let instruments = ResourceManager::<Gadget>::new();
    let instrument_library = instrument_library();
    let libraries = ProjectLibraries {
        hardware: &hw_library,
        instruments: &instrument_library,
        modules: &instrument_library,
    };
    let managers = ProjectManagers {
        hardware: &hardware,
        instruments: &instruments,
        modules: &instruments,
    };
    load_project_from_str(xml, &libraries, &managers).unwrap();
    assert_eq!(hardware.len(), 1);
}

#[test]
fn malformed_numeric_field_is_rejected() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<Project>
  <HardwareAdapters>
    <Item Name="Widget" Category="HardwareAdapter" ID="1">
      <Params>
        <Field key="retries" kind="Int">not-a-number</Field>
      </Params>
    </Item>
  </HardwareAdapters>
  <Instruments></Instruments>
  <Modules></Modules>
</Project>"#;

    let hardware = ResourceManager::<Widget>::new();
    let hw_library = hardware_library();
    let instruments = ResourceManager::<Gadget>::new();
    let instrument_library = instrument_library();
    let libraries = ProjectLibraries {
        hardware: &hw_library,
        instruments: &instrument_library,
        modules: &instrument_library,
    };
    let managers = ProjectManagers {
        hardware: &hardware,
        instruments: &instruments,
        modules: &instruments,
    };
    let err = load_project_from_str(xml, &libraries, &managers).unwrap_err();
    assert!(matches!(err, labcore_error::Error::InvalidData { .. }));
}

#[test]
fn loading_raises_the_id_allocator_floor() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<Project>
  <HardwareAdapters>
    <Item Name="Widget" Category="HardwareAdapter" ID="41">
      <Params></Params>
    </Item>
  </HardwareAdapters>
  <Instruments></Instruments>
  <Modules></Modules>
</Project>"#;

    let hardware = ResourceManager::<Widget>::new();
    let hw_library = hardware_library();
    let instruments = ResourceManager::<Gadget>::new();
    let instrument_library = instrument_library();
    let libraries = ProjectLibraries {
        hardware: &hw_library,
        instruments: &instrument_library,
        modules: &instrument_library,
    };
    let managers = ProjectManagers {
        hardware: &hardware,
        instruments: &instruments,
        modules: &instruments,
    };
    load_project_from_str(xml, &libraries, &managers).unwrap();
    assert_eq!(hardware.allocate_id().get(), 42);
}

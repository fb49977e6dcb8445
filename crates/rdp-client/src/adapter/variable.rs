use std::cmp::Ordering;
use std::sync::Arc;

use crate::adapter::{ObjectGripAdapter, ThreadAdapter};
use crate::error::Result;
use crate::protocol::{Grip, PropertyDescriptor, SafeGetterValueDescriptor};

/// A named value as a host displays it, with an optional provider for its
/// children.
pub struct VariableAdapter {
    name: String,
    value: String,
    provider: Option<Arc<ObjectGripAdapter>>,
}

impl VariableAdapter {
    /// Objects get a child provider holding a reference on the grip.
    pub fn from_grip(
        name: &str,
        grip: &Grip,
        thread_lifetime: bool,
        thread: &Arc<ThreadAdapter>,
    ) -> Result<Self> {
        let provider = match grip.as_object() {
            Some(object) => Some(thread.create_object_grip_adapter(object, thread_lifetime)?),
            None => None,
        };
        Ok(Self {
            name: name.to_string(),
            value: render_grip(grip),
            provider,
        })
    }

    pub fn from_property_descriptor(
        name: &str,
        descriptor: &PropertyDescriptor,
        thread_lifetime: bool,
        thread: &Arc<ThreadAdapter>,
    ) -> Result<Self> {
        if let Some(value) = &descriptor.value {
            return Self::from_grip(name, value, thread_lifetime, thread);
        }

        let present = |accessor: &Option<Grip>| {
            accessor
                .as_ref()
                .is_some_and(|grip| !matches!(grip, Grip::Undefined | Grip::Null))
        };
        let value = match (present(&descriptor.get), present(&descriptor.set)) {
            (true, true) => "Getter & Setter",
            (true, false) => "Getter",
            (false, true) => "Setter",
            (false, false) => "undefined",
        };
        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
            provider: None,
        })
    }

    pub fn from_safe_getter_value_descriptor(
        name: &str,
        descriptor: &SafeGetterValueDescriptor,
        thread_lifetime: bool,
        thread: &Arc<ThreadAdapter>,
    ) -> Result<Self> {
        Self::from_grip(name, &descriptor.getter_value, thread_lifetime, thread)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn variables_provider(&self) -> Option<&Arc<ObjectGripAdapter>> {
        self.provider.as_ref()
    }

    /// Id a host uses to ask for this value's children; 0 when it has none.
    pub fn variables_reference(&self) -> u32 {
        self.provider
            .as_ref()
            .map_or(0, |provider| provider.variables_provider_id())
    }
}

impl std::fmt::Debug for VariableAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableAdapter")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("variables_reference", &self.variables_reference())
            .finish()
    }
}

pub fn render_grip(grip: &Grip) -> String {
    match grip {
        Grip::Bool(b) => b.to_string(),
        Grip::Number(n) => n.to_string(),
        Grip::String(s) => format!("\"{s}\""),
        Grip::Undefined => "undefined".to_string(),
        Grip::Null => "null".to_string(),
        Grip::Infinity => "Infinity".to_string(),
        Grip::NegativeInfinity => "-Infinity".to_string(),
        Grip::NaN => "NaN".to_string(),
        Grip::NegativeZero => "-0".to_string(),
        Grip::Symbol { name } => format!("Symbol({})", name.as_deref().unwrap_or_default()),
        Grip::LongString(long) => format!("\"{}…\"", long.initial),
        Grip::Object(object) if object.class == "Function" => {
            let name = object
                .display_name
                .as_deref()
                .or(object.name.as_deref())
                .unwrap_or_default();
            format!("function {name}()")
        }
        Grip::Object(object) => object.class.clone(),
        Grip::Unknown(value) => value.to_string(),
    }
}

/// Index-like names first in numeric order, then the rest case-insensitively.
pub fn sort_variables(variables: &mut [VariableAdapter]) {
    variables.sort_by(|a, b| compare_names(&a.name, &b.name));
}

fn compare_names(a: &str, b: &str) -> Ordering {
    match (is_index(a), is_index(b)) {
        (true, true) => {
            let a = a.trim_start_matches('0');
            let b = b.trim_start_matches('0');
            a.len().cmp(&b.len()).then_with(|| a.cmp(b))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a
            .to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b)),
    }
}

fn is_index(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
}

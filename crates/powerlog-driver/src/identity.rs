use serde::Serialize;

/// Reply to `*idn?`, split on `,`.
///
/// The fields are positional and device-defined: manufacturer, model, serial
/// number, firmware. Missing trailing fields are tolerated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub fields: Vec<String>,
}

impl Identity {
    pub fn parse(reply: &str) -> Self {
        let reply = reply.trim();
        if reply.is_empty() {
            return Self::default();
        }
        Self {
            fields: reply.split(',').map(|f| f.trim().to_string()).collect(),
        }
    }

    pub fn manufacturer(&self) -> Option<&str> {
        self.field(0)
    }

    pub fn model(&self) -> Option<&str> {
        self.field(1)
    }

    pub fn serial(&self) -> Option<&str> {
        self.field(2)
    }

    pub fn firmware(&self) -> Option<&str> {
        self.field(3)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }
}

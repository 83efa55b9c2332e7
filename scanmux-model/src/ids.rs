use uuid::Uuid;

/// Opaque handle issued to a caller at registration time.
///
/// Every request, liveness notification and delivery is keyed by this handle,
/// never by the identity of the caller's result channel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientId(pub Uuid);

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientId {
    pub fn new() -> Self {
        ClientId(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn to_uuid(&self) -> Uuid {
        self.0
    }
}

impl AsRef<Uuid> for ClientId {
    fn as_ref(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of the radio interface a scan engine is bound to (e.g. `wlan0`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct IfaceName(String);

impl IfaceName {
    pub fn new(name: impl Into<String>) -> Self {
        IfaceName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for IfaceName {
    fn from(value: &str) -> Self {
        IfaceName(value.to_string())
    }
}

impl From<String> for IfaceName {
    fn from(value: String) -> Self {
        IfaceName(value)
    }
}

impl std::fmt::Display for IfaceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ids_are_unique() {
        let first = ClientId::new();
        let second = ClientId::new();
        assert_ne!(first, second);
    }

    #[test]
    fn iface_name_displays_raw_name() {
        let iface = IfaceName::from("wlan1");
        assert_eq!(iface.to_string(), "wlan1");
        assert_eq!(iface.as_str(), "wlan1");
    }
}

//! In-memory message model.
//!
//! The pipeline never parses wire bytes; the surrounding framework hands it an
//! [`Envelope`] already split into header blocks and body content.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::token::TokenStore;

/// WS-Security extension namespace
pub const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";

/// Local name of the security header block
pub const WSSE_LN: &str = "Security";

/// WS-Security utility namespace (`wsu:Id`, `wsu:Timestamp`)
pub const WSU_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";

/// SOAP protocol version of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoapVersion {
    /// SOAP 1.1
    Soap11,
    /// SOAP 1.2
    Soap12,
}

impl SoapVersion {
    /// Envelope namespace URI
    #[must_use]
    pub const fn envelope_uri(&self) -> &'static str {
        match self {
            Self::Soap11 => "http://schemas.xmlsoap.org/soap/envelope/",
            Self::Soap12 => "http://www.w3.org/2003/05/soap-envelope",
        }
    }

    /// Attribute naming the header addressee (`actor` in 1.1, `role` in 1.2)
    #[must_use]
    pub fn actor_attribute(&self) -> QName {
        let local = match self {
            Self::Soap11 => "actor",
            Self::Soap12 => "role",
        };
        QName::new(self.envelope_uri(), local)
    }

    /// Qualified name of the body element
    #[must_use]
    pub fn body_name(&self) -> QName {
        QName::new(self.envelope_uri(), "Body")
    }

    /// Qualified name of the fault element
    #[must_use]
    pub fn fault_name(&self) -> QName {
        QName::new(self.envelope_uri(), "Fault")
    }
}

/// Namespace-qualified XML name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QName {
    /// Namespace URI (empty for unqualified names)
    pub namespace: String,
    /// Local part
    pub local_name: String,
}

impl QName {
    /// Creates a qualified name
    #[must_use]
    pub fn new(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local_name: local_name.into(),
        }
    }

    /// Whether this name has the given namespace and local part
    #[must_use]
    pub fn matches(&self, namespace: &str, local_name: &str) -> bool {
        self.namespace == namespace && self.local_name == local_name
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.local_name)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local_name)
        }
    }
}

/// A node of the in-memory XML tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Element name
    pub name: QName,
    /// Attributes in document order
    pub attributes: Vec<(QName, String)>,
    /// Child elements in document order
    pub children: Vec<Element>,
    /// Text content, if any
    pub text: Option<String>,
}

impl Element {
    /// Creates an empty element
    #[must_use]
    pub fn new(name: QName) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Adds an attribute
    #[must_use]
    pub fn with_attribute(mut self, name: QName, value: impl Into<String>) -> Self {
        self.attributes.push((name, value.into()));
        self
    }

    /// Adds a child element
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// Sets the text content
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Value of the attribute with the given name
    #[must_use]
    pub fn attribute(&self, name: &QName) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// The `wsu:Id` of this element
    #[must_use]
    pub fn wsu_id(&self) -> Option<&str> {
        self.attribute(&QName::new(WSU_NS, "Id"))
    }

    /// First direct child with the given name
    #[must_use]
    pub fn find_child(&self, name: &QName) -> Option<&Self> {
        self.children.iter().find(|c| &c.name == name)
    }

    /// First element with the given name in this subtree, depth first,
    /// including this element
    #[must_use]
    pub fn find_descendant(&self, name: &QName) -> Option<&Self> {
        if &self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_descendant(name))
    }
}

/// A SOAP envelope split into header blocks and body content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Protocol version
    pub version: SoapVersion,
    /// Header blocks in document order
    pub header: Vec<Element>,
    /// Body children in document order
    pub body: Vec<Element>,
}

impl Envelope {
    /// Creates an envelope with empty header and body
    #[must_use]
    pub const fn new(version: SoapVersion) -> Self {
        Self {
            version,
            header: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Appends a header block
    #[must_use]
    pub fn with_header_block(mut self, block: Element) -> Self {
        self.header.push(block);
        self
    }

    /// Appends body content
    #[must_use]
    pub fn with_body_element(mut self, element: Element) -> Self {
        self.body.push(element);
        self
    }

    /// All header blocks in the WS-Security namespace named `Security`
    pub fn security_headers(&self) -> impl Iterator<Item = &Element> {
        self.header
            .iter()
            .filter(|block| block.name.matches(WSSE_NS, WSSE_LN))
    }

    /// The first WS-Security header block
    #[must_use]
    pub fn security_header(&self) -> Option<&Element> {
        self.security_headers().next()
    }

    /// Whether the body carries a SOAP fault anywhere in its content
    #[must_use]
    pub fn is_fault(&self) -> bool {
        let fault = self.version.fault_name();
        self.body.iter().any(|e| e.find_descendant(&fault).is_some())
    }
}

/// Service and operation a message is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceIdentity {
    /// Service name
    pub service: String,
    /// Operation name, when dispatch already resolved it
    pub operation: Option<String>,
}

impl ServiceIdentity {
    /// Identity for a whole service
    #[must_use]
    pub fn service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            operation: None,
        }
    }

    /// Identity for a single operation of a service
    #[must_use]
    pub fn operation(service: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            operation: Some(operation.into()),
        }
    }
}

impl fmt::Display for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operation {
            Some(op) => write!(f, "{}.{}", self.service, op),
            None => f.write_str(&self.service),
        }
    }
}

/// The in-flight message handed to the pipeline.
///
/// The caller owns it for the whole exchange; `process` borrows it and may
/// replace the envelope with its restored (e.g. decrypted) wire form.
pub struct MessageContext {
    envelope: Envelope,
    service: ServiceIdentity,
    token_store: Arc<dyn TokenStore>,
    transport_secure: bool,
    message_id: Option<String>,
}

impl MessageContext {
    /// Creates a context bound to the token store of its security context
    #[must_use]
    pub fn new(envelope: Envelope, service: ServiceIdentity, token_store: Arc<dyn TokenStore>) -> Self {
        Self {
            envelope,
            service,
            token_store,
            transport_secure: false,
            message_id: None,
        }
    }

    /// Marks whether the message arrived over a secure transport
    #[must_use]
    pub const fn with_transport_secure(mut self, secure: bool) -> Self {
        self.transport_secure = secure;
        self
    }

    /// Sets the WS-Addressing message id
    #[must_use]
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Current wire-form envelope
    #[must_use]
    pub const fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Replaces the wire-form envelope
    pub fn set_envelope(&mut self, envelope: Envelope) {
        self.envelope = envelope;
    }

    /// Consumes the context, returning the envelope
    #[must_use]
    pub fn into_envelope(self) -> Envelope {
        self.envelope
    }

    /// Addressed service
    #[must_use]
    pub const fn service(&self) -> &ServiceIdentity {
        &self.service
    }

    /// Token store of this security context
    #[must_use]
    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.token_store
    }

    /// Whether the transport is secure (e.g. HTTPS)
    #[must_use]
    pub const fn is_transport_secure(&self) -> bool {
        self.transport_secure
    }

    /// WS-Addressing message id, if any
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }
}

impl fmt::Debug for MessageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageContext")
            .field("service", &self.service)
            .field("message_id", &self.message_id)
            .field("transport_secure", &self.transport_secure)
            .field("envelope", &self.envelope)
            .finish_non_exhaustive()
    }
}

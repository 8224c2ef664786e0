//! MQTT 5 property identifiers, their wire types, and the property set carried
//! by most control packets.
//!
//! The property table is a `const` match on [`PropertyId`], so it is built at
//! compile time and shared by the reader and the writer of property blocks.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use super::error::CodecError;

/// Wire encoding of a property value.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PropertyType {
    /// One byte.
    Byte,
    /// Big-endian 16-bit integer.
    TwoByteInteger,
    /// Big-endian 32-bit integer.
    FourByteInteger,
    /// Variable Byte Integer.
    VariableByteInteger,
    /// Length-prefixed UTF-8 string.
    Utf8String,
    /// Two consecutive length-prefixed UTF-8 strings.
    Utf8StringPair,
    /// Length-prefixed binary data.
    BinaryData,
    /// A Variable Byte Integer that may repeat; every occurrence is kept.
    VariableByteIntegerArray,
}

/// MQTT 5 property identifiers.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum PropertyId {
    PayloadFormatIndicator = 1,
    MessageExpiryInterval = 2,
    ContentType = 3,
    ResponseTopic = 8,
    CorrelationData = 9,
    SubscriptionIdentifier = 11,
    SessionExpiryInterval = 17,
    AssignedClientIdentifier = 18,
    ServerKeepAlive = 19,
    AuthenticationMethod = 21,
    AuthenticationData = 22,
    RequestProblemInformation = 23,
    WillDelayInterval = 24,
    RequestResponseInformation = 25,
    ResponseInformation = 26,
    ServerReference = 28,
    ReasonString = 31,
    ReceiveMaximum = 33,
    TopicAliasMaximum = 34,
    TopicAlias = 35,
    MaximumQoS = 36,
    RetainAvailable = 37,
    UserProperty = 38,
    MaximumPacketSize = 39,
    WildcardSubscriptionAvailable = 40,
    SubscriptionIdentifiersAvailable = 41,
    SharedSubscriptionAvailable = 42,
}

impl PropertyId {
    /// Look up an identifier read from the wire.
    pub const fn from_u32(id: u32) -> Option<Self> {
        Some(match id {
            1 => PropertyId::PayloadFormatIndicator,
            2 => PropertyId::MessageExpiryInterval,
            3 => PropertyId::ContentType,
            8 => PropertyId::ResponseTopic,
            9 => PropertyId::CorrelationData,
            11 => PropertyId::SubscriptionIdentifier,
            17 => PropertyId::SessionExpiryInterval,
            18 => PropertyId::AssignedClientIdentifier,
            19 => PropertyId::ServerKeepAlive,
            21 => PropertyId::AuthenticationMethod,
            22 => PropertyId::AuthenticationData,
            23 => PropertyId::RequestProblemInformation,
            24 => PropertyId::WillDelayInterval,
            25 => PropertyId::RequestResponseInformation,
            26 => PropertyId::ResponseInformation,
            28 => PropertyId::ServerReference,
            31 => PropertyId::ReasonString,
            33 => PropertyId::ReceiveMaximum,
            34 => PropertyId::TopicAliasMaximum,
            35 => PropertyId::TopicAlias,
            36 => PropertyId::MaximumQoS,
            37 => PropertyId::RetainAvailable,
            38 => PropertyId::UserProperty,
            39 => PropertyId::MaximumPacketSize,
            40 => PropertyId::WildcardSubscriptionAvailable,
            41 => PropertyId::SubscriptionIdentifiersAvailable,
            42 => PropertyId::SharedSubscriptionAvailable,
            _ => return None,
        })
    }

    /// The wire type mandated for this property.
    pub const fn property_type(self) -> PropertyType {
        match self {
            PropertyId::PayloadFormatIndicator
            | PropertyId::RequestProblemInformation
            | PropertyId::RequestResponseInformation
            | PropertyId::MaximumQoS
            | PropertyId::RetainAvailable
            | PropertyId::WildcardSubscriptionAvailable
            | PropertyId::SubscriptionIdentifiersAvailable
            | PropertyId::SharedSubscriptionAvailable => PropertyType::Byte,
            PropertyId::ServerKeepAlive
            | PropertyId::ReceiveMaximum
            | PropertyId::TopicAliasMaximum
            | PropertyId::TopicAlias => PropertyType::TwoByteInteger,
            PropertyId::MessageExpiryInterval
            | PropertyId::SessionExpiryInterval
            | PropertyId::WillDelayInterval
            | PropertyId::MaximumPacketSize => PropertyType::FourByteInteger,
            PropertyId::SubscriptionIdentifier => PropertyType::VariableByteIntegerArray,
            PropertyId::ContentType
            | PropertyId::ResponseTopic
            | PropertyId::AssignedClientIdentifier
            | PropertyId::AuthenticationMethod
            | PropertyId::ResponseInformation
            | PropertyId::ServerReference
            | PropertyId::ReasonString => PropertyType::Utf8String,
            PropertyId::CorrelationData | PropertyId::AuthenticationData => {
                PropertyType::BinaryData
            }
            PropertyId::UserProperty => PropertyType::Utf8StringPair,
        }
    }
}

/// A typed property value. The variant always matches
/// [`PropertyId::property_type`] for the key it is stored under.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum PropertyValue {
    /// [`PropertyType::Byte`]
    Byte(u8),
    /// [`PropertyType::TwoByteInteger`]
    TwoByteInteger(u16),
    /// [`PropertyType::FourByteInteger`]
    FourByteInteger(u32),
    /// [`PropertyType::VariableByteInteger`]
    VariableByteInteger(u32),
    /// [`PropertyType::Utf8String`]
    String(String),
    /// [`PropertyType::BinaryData`]
    Binary(Vec<u8>),
    /// [`PropertyType::VariableByteIntegerArray`]
    VariableByteIntegers(Vec<u32>),
}

impl PropertyValue {
    /// The wire type of this value.
    pub fn property_type(&self) -> PropertyType {
        match self {
            PropertyValue::Byte(_) => PropertyType::Byte,
            PropertyValue::TwoByteInteger(_) => PropertyType::TwoByteInteger,
            PropertyValue::FourByteInteger(_) => PropertyType::FourByteInteger,
            PropertyValue::VariableByteInteger(_) => PropertyType::VariableByteInteger,
            PropertyValue::String(_) => PropertyType::Utf8String,
            PropertyValue::Binary(_) => PropertyType::BinaryData,
            PropertyValue::VariableByteIntegers(_) => PropertyType::VariableByteIntegerArray,
        }
    }
}

/// The property block of one control packet.
///
/// Typed properties live in an ordered map keyed by identifier; User
/// Properties are kept separately, in wire order, because they may repeat
/// and carry a key/value pair instead of a single value.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct Properties {
    values: BTreeMap<PropertyId, PropertyValue>,
    user_properties: Vec<(String, String)>,
}

impl Properties {
    /// An empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when neither typed nor user properties are present.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.user_properties.is_empty()
    }

    /// Store `value` under `id`, replacing a previous value.
    ///
    /// Fails when the value's type disagrees with the property table, or for
    /// an empty repeatable list, which has no encoding.
    /// User Properties go through [`Properties::push_user_property`].
    pub fn set(&mut self, id: PropertyId, value: PropertyValue) -> Result<(), CodecError> {
        if value.property_type() != id.property_type() {
            return Err(CodecError::PropertyTypeMismatch { id: id as u8 });
        }
        if matches!(&value, PropertyValue::VariableByteIntegers(list) if list.is_empty()) {
            return Err(CodecError::ValueOutOfRange);
        }
        self.values.insert(id, value);
        Ok(())
    }

    /// Store an integer under `id`, choosing the width from the property table.
    pub fn set_integer(&mut self, id: PropertyId, value: u32) -> Result<(), CodecError> {
        let value = match id.property_type() {
            PropertyType::Byte => {
                PropertyValue::Byte(u8::try_from(value).map_err(|_| CodecError::ValueOutOfRange)?)
            }
            PropertyType::TwoByteInteger => PropertyValue::TwoByteInteger(
                u16::try_from(value).map_err(|_| CodecError::ValueOutOfRange)?,
            ),
            PropertyType::FourByteInteger => PropertyValue::FourByteInteger(value),
            PropertyType::VariableByteInteger => PropertyValue::VariableByteInteger(value),
            PropertyType::VariableByteIntegerArray => {
                self.push_variable_integer(id, value)?;
                return Ok(());
            }
            _ => return Err(CodecError::PropertyTypeMismatch { id: id as u8 }),
        };
        self.set(id, value)
    }

    /// Store a string under `id`.
    pub fn set_string(&mut self, id: PropertyId, value: impl Into<String>) -> Result<(), CodecError> {
        self.set(id, PropertyValue::String(value.into()))
    }

    /// Store binary data under `id`.
    pub fn set_binary(&mut self, id: PropertyId, value: impl Into<Vec<u8>>) -> Result<(), CodecError> {
        self.set(id, PropertyValue::Binary(value.into()))
    }

    /// Append one occurrence of a repeatable Variable Byte Integer property.
    pub fn push_variable_integer(&mut self, id: PropertyId, value: u32) -> Result<(), CodecError> {
        if id.property_type() != PropertyType::VariableByteIntegerArray {
            return Err(CodecError::PropertyTypeMismatch { id: id as u8 });
        }
        match self
            .values
            .entry(id)
            .or_insert_with(|| PropertyValue::VariableByteIntegers(Vec::new()))
        {
            PropertyValue::VariableByteIntegers(list) => {
                list.push(value);
                Ok(())
            }
            _ => Err(CodecError::PropertyTypeMismatch { id: id as u8 }),
        }
    }

    /// Append a User Property pair.
    pub fn push_user_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.user_properties.push((key.into(), value.into()));
    }

    /// Remove and return the value stored under `id`.
    pub fn remove(&mut self, id: PropertyId) -> Option<PropertyValue> {
        self.values.remove(&id)
    }

    /// The value stored under `id`.
    pub fn get(&self, id: PropertyId) -> Option<&PropertyValue> {
        self.values.get(&id)
    }

    /// Any integer-typed value stored under `id`, widened to `u32`.
    pub fn integer(&self, id: PropertyId) -> Option<u32> {
        match self.values.get(&id)? {
            PropertyValue::Byte(v) => Some(u32::from(*v)),
            PropertyValue::TwoByteInteger(v) => Some(u32::from(*v)),
            PropertyValue::FourByteInteger(v) | PropertyValue::VariableByteInteger(v) => Some(*v),
            _ => None,
        }
    }

    /// The string stored under `id`.
    pub fn string(&self, id: PropertyId) -> Option<&str> {
        match self.values.get(&id)? {
            PropertyValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The binary data stored under `id`.
    pub fn binary(&self, id: PropertyId) -> Option<&[u8]> {
        match self.values.get(&id)? {
            PropertyValue::Binary(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    /// Every occurrence of a repeatable Variable Byte Integer property.
    pub fn variable_integers(&self, id: PropertyId) -> &[u32] {
        match self.values.get(&id) {
            Some(PropertyValue::VariableByteIntegers(list)) => list.as_slice(),
            _ => &[],
        }
    }

    /// Typed properties in ascending identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &PropertyValue)> {
        self.values.iter().map(|(id, value)| (*id, value))
    }

    /// User Property pairs in wire order.
    pub fn user_properties(&self) -> &[(String, String)] {
        &self.user_properties
    }

    /// Take the User Property pairs out of the set.
    pub fn take_user_properties(&mut self) -> Vec<(String, String)> {
        core::mem::take(&mut self.user_properties)
    }

    pub(crate) fn contains(&self, id: PropertyId) -> bool {
        self.values.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_wire_types() {
        assert_eq!(PropertyId::PayloadFormatIndicator.property_type(), PropertyType::Byte);
        assert_eq!(PropertyId::ContentType.property_type(), PropertyType::Utf8String);
        assert_eq!(PropertyId::CorrelationData.property_type(), PropertyType::BinaryData);
        assert_eq!(
            PropertyId::SubscriptionIdentifier.property_type(),
            PropertyType::VariableByteIntegerArray
        );
        assert_eq!(PropertyId::SessionExpiryInterval.property_type(), PropertyType::FourByteInteger);
        assert_eq!(PropertyId::ServerKeepAlive.property_type(), PropertyType::TwoByteInteger);
        assert_eq!(PropertyId::UserProperty.property_type(), PropertyType::Utf8StringPair);
        assert_eq!(PropertyId::MaximumPacketSize.property_type(), PropertyType::FourByteInteger);
    }

    #[test]
    fn every_known_id_round_trips_through_lookup() {
        for raw in 0..=64u32 {
            if let Some(id) = PropertyId::from_u32(raw) {
                assert_eq!(id as u32, raw);
            }
        }
        assert_eq!(PropertyId::from_u32(0), None);
        assert_eq!(PropertyId::from_u32(4), None);
        assert_eq!(PropertyId::from_u32(43), None);
    }

    #[test]
    fn set_rejects_inconsistent_type() {
        let mut props = Properties::new();
        assert_eq!(
            props.set(PropertyId::ContentType, PropertyValue::Byte(1)),
            Err(CodecError::PropertyTypeMismatch { id: 3 })
        );
        assert!(props.is_empty());
    }

    #[test]
    fn set_integer_checks_width() {
        let mut props = Properties::new();
        assert_eq!(
            props.set_integer(PropertyId::ReceiveMaximum, 70_000),
            Err(CodecError::ValueOutOfRange)
        );
        props.set_integer(PropertyId::ReceiveMaximum, 10).unwrap();
        assert_eq!(props.get(PropertyId::ReceiveMaximum), Some(&PropertyValue::TwoByteInteger(10)));
        assert_eq!(props.integer(PropertyId::ReceiveMaximum), Some(10));
    }

    #[test]
    fn subscription_identifiers_accumulate() {
        let mut props = Properties::new();
        props.set_integer(PropertyId::SubscriptionIdentifier, 7).unwrap();
        props.push_variable_integer(PropertyId::SubscriptionIdentifier, 300).unwrap();
        assert_eq!(props.variable_integers(PropertyId::SubscriptionIdentifier), &[7, 300]);
    }

    #[test]
    fn empty_subscription_identifier_list_is_rejected() {
        let mut props = Properties::new();
        assert_eq!(
            props.set(
                PropertyId::SubscriptionIdentifier,
                PropertyValue::VariableByteIntegers(Vec::new())
            ),
            Err(CodecError::ValueOutOfRange)
        );
        assert!(props.is_empty());

        props
            .set(
                PropertyId::SubscriptionIdentifier,
                PropertyValue::VariableByteIntegers(vec![5]),
            )
            .unwrap();
        assert_eq!(props.variable_integers(PropertyId::SubscriptionIdentifier), &[5]);
    }

    #[test]
    fn user_properties_keep_duplicates_in_order() {
        let mut props = Properties::new();
        props.push_user_property("k", "1");
        props.push_user_property("k", "2");
        assert_eq!(props.user_properties().len(), 2);
        assert_eq!(props.user_properties()[1].1, "2");
        assert!(!props.is_empty());
    }
}

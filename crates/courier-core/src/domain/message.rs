//! Message / Envelope / Batch - 配送単位の定義
//!
//! # 二層構造
//! - **表層**: `Message` trait - ユーザーが実装するマーカー
//! - **内部**: `AnyMessage` trait - object-safe, type erasure（blanket impl）
//!
//! Batch は `Envelope::Batch` としてのみ認識されます。
//! 任意の iterable を Batch として扱うことはしません。

use std::any::{Any, type_name};
use std::fmt;

/// A unit of work or event, routed by its concrete type.
///
/// ```ignore
/// struct PlaceOrder {
///     sku: String,
///     result: Option<OrderId>,
/// }
///
/// impl Message for PlaceOrder {}
/// ```
///
/// Messages are handed to handlers as `&mut Self`, so a handler can write a
/// result back for the caller to read once dispatch returns.
pub trait Message: Send + 'static {}

/// Object-safe view of a [`Message`]. Implemented for every message type.
pub trait AnyMessage: Send {
    fn type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Message> AnyMessage for T {
    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

impl<'a> dyn AnyMessage + 'a {
    pub fn is<M: Message>(&self) -> bool {
        self.as_any().is::<M>()
    }

    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.as_any().downcast_ref()
    }

    pub fn downcast_mut<M: Message>(&mut self) -> Option<&mut M> {
        self.as_any_mut().downcast_mut()
    }

    pub fn downcast<M: Message>(self: Box<Self>) -> Result<Box<M>, Box<dyn Any>> {
        self.into_any().downcast()
    }
}

/// One entry handed to dispatch: a message, or a nested batch.
pub enum Envelope<'a> {
    /// Borrowed from the caller, who reads it back after dispatch.
    Borrowed(&'a mut dyn AnyMessage),
    /// Owned by the envelope; used when the caller cannot keep a borrow alive,
    /// e.g. deferred dispatch.
    Owned(Box<dyn AnyMessage>),
    Batch(Batch<'a>),
}

impl Envelope<'_> {
    pub fn owned<M: Message>(message: M) -> Self {
        Envelope::Owned(Box::new(message))
    }

    /// Concrete type name of the message, or `None` for a batch.
    pub fn type_name(&self) -> Option<&'static str> {
        match self {
            Envelope::Borrowed(message) => Some(message.type_name()),
            Envelope::Owned(message) => Some(message.type_name()),
            Envelope::Batch(_) => None,
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Envelope::Batch(_))
    }
}

impl<'a, M: Message> From<&'a mut M> for Envelope<'a> {
    fn from(message: &'a mut M) -> Self {
        Envelope::Borrowed(message)
    }
}

impl<'a> From<Batch<'a>> for Envelope<'a> {
    fn from(batch: Batch<'a>) -> Self {
        Envelope::Batch(batch)
    }
}

impl<'a> From<Vec<Envelope<'a>>> for Envelope<'a> {
    fn from(envelopes: Vec<Envelope<'a>>) -> Self {
        Envelope::Batch(Batch::from(envelopes))
    }
}

impl fmt::Debug for Envelope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Envelope::Borrowed(message) => f.debug_tuple("Borrowed").field(&message.type_name()).finish(),
            Envelope::Owned(message) => f.debug_tuple("Owned").field(&message.type_name()).finish(),
            Envelope::Batch(batch) => f.debug_tuple("Batch").field(batch).finish(),
        }
    }
}

/// Ordered sequence of envelopes dispatched as one fail-fast unit.
///
/// Batches may nest; dispatch flattens them in place.
#[derive(Debug, Default)]
pub struct Batch<'a> {
    envelopes: Vec<Envelope<'a>>,
}

impl<'a> Batch<'a> {
    pub fn new() -> Self {
        Self {
            envelopes: Vec::new(),
        }
    }

    pub fn push(&mut self, envelope: impl Into<Envelope<'a>>) {
        self.envelopes.push(envelope.into());
    }

    pub fn with(mut self, envelope: impl Into<Envelope<'a>>) -> Self {
        self.push(envelope);
        self
    }

    /// Number of direct entries; nested batches count as one.
    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Envelope<'a>> {
        self.envelopes.iter()
    }

    pub fn push_owned<M: Message>(&mut self, message: M) {
        self.envelopes.push(Envelope::owned(message));
    }
}

impl<'a> From<Vec<Envelope<'a>>> for Batch<'a> {
    fn from(envelopes: Vec<Envelope<'a>>) -> Self {
        Self { envelopes }
    }
}

impl<'a> From<Envelope<'a>> for Batch<'a> {
    fn from(envelope: Envelope<'a>) -> Self {
        match envelope {
            Envelope::Batch(batch) => batch,
            single => Self {
                envelopes: vec![single],
            },
        }
    }
}

impl<'a, M: Message> From<&'a mut M> for Batch<'a> {
    fn from(message: &'a mut M) -> Self {
        Self::from(Envelope::from(message))
    }
}

impl<'a> FromIterator<Envelope<'a>> for Batch<'a> {
    fn from_iter<I: IntoIterator<Item = Envelope<'a>>>(iter: I) -> Self {
        Self {
            envelopes: iter.into_iter().collect(),
        }
    }
}

impl<'a> Extend<Envelope<'a>> for Batch<'a> {
    fn extend<I: IntoIterator<Item = Envelope<'a>>>(&mut self, iter: I) {
        self.envelopes.extend(iter);
    }
}

impl<'a> IntoIterator for Batch<'a> {
    type Item = Envelope<'a>;
    type IntoIter = std::vec::IntoIter<Envelope<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.envelopes.into_iter()
    }
}

/// Builds a [`Batch`] from anything convertible into an [`Envelope`].
///
/// ```ignore
/// registry.dispatch(&ctx, batch![&mut first, batch![&mut second, &mut third]]).await?;
/// ```
#[macro_export]
macro_rules! batch {
    () => {
        $crate::domain::Batch::new()
    };
    ($($envelope:expr),+ $(,)?) => {
        $crate::domain::Batch::from(vec![$($crate::domain::Envelope::from($envelope)),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Ping(u32);
    impl Message for Ping {}

    #[derive(Debug)]
    struct Pong;
    impl Message for Pong {}

    #[test]
    fn any_message_reports_concrete_type_name() {
        let ping = Ping(1);
        let erased: &dyn AnyMessage = &ping;
        assert!(erased.type_name().ends_with("message::tests::Ping"));
    }

    #[test]
    fn downcast_mut_writes_through_to_the_original() {
        let mut ping = Ping(1);
        {
            let erased: &mut dyn AnyMessage = &mut ping;
            erased.downcast_mut::<Ping>().unwrap().0 = 7;
            assert!(erased.downcast_mut::<Pong>().is_none());
        }
        assert_eq!(ping, Ping(7));
    }

    #[test]
    fn boxed_downcast_checks_the_concrete_type() {
        let wrong: Box<dyn AnyMessage> = Box::new(Ping(3));
        assert!(wrong.downcast::<Pong>().is_err());

        let right: Box<dyn AnyMessage> = Box::new(Ping(3));
        assert_eq!(*right.downcast::<Ping>().unwrap(), Ping(3));
    }

    #[test]
    fn batch_macro_keeps_order_and_nesting() {
        let mut a = Ping(1);
        let mut b = Ping(2);
        let mut c = Pong;

        let batch = crate::batch![&mut a, crate::batch![&mut b, &mut c]];

        assert_eq!(batch.len(), 2);
        let entries: Vec<_> = batch.iter().collect();
        assert!(!entries[0].is_batch());
        assert!(entries[1].is_batch());
        match entries[1] {
            Envelope::Batch(inner) => assert_eq!(inner.len(), 2),
            _ => panic!("expected nested batch"),
        }
    }

    #[test]
    fn single_envelope_converts_into_one_entry_batch() {
        let mut ping = Ping(1);
        let batch = Batch::from(&mut ping);
        assert_eq!(batch.len(), 1);

        let empty: Batch<'_> = crate::batch![];
        assert!(empty.is_empty());
    }

    #[test]
    fn batch_envelope_converts_without_extra_nesting() {
        let nested = Envelope::from(Batch::new().with(Envelope::owned(Ping(1))));
        let batch = Batch::from(nested);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.iter().next().unwrap().type_name(), Some(std::any::type_name::<Ping>()));
    }
}

//! MessageKey - メッセージ型の識別子
//!
//! 同一性は `TypeId`、表示用の名前は型の完全修飾名（モジュールパス + ローカル名）です。
//! 同じ名前を表示する別々の型（同じ crate の別バージョンなど）も別のキーになります。
//!
//! # 導出できない型
//! 参照・ポインタ・タプル・配列・スライス・関数ポインタ・trait object は
//! 定義スコープを持たない構造的な型なので、キーは `None` になります。
//! Registry はこれを「メッセージではない」という合図として使います。

use std::any::{TypeId, type_name};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use super::message::{AnyMessage, Message};
use crate::typed::Handler;

/// Identifier of a message type.
///
/// Equality and hashing use the type's `TypeId`. The qualified type name is
/// for display and ordering only; distinct types may share one.
#[derive(Clone, Copy)]
pub struct MessageKey {
    id: TypeId,
    name: &'static str,
}

impl MessageKey {
    /// Key of `T`, or `None` when `T` is a structural (unnamed) type.
    pub fn of<T: ?Sized + 'static>() -> Option<Self> {
        Self::from_parts(TypeId::of::<T>(), type_name::<T>())
    }

    /// Key of a message value's concrete type.
    pub fn of_val(message: &dyn AnyMessage) -> Option<Self> {
        Self::from_parts(message.as_any().type_id(), message.type_name())
    }

    /// Key of the message type a handler is bound to.
    ///
    /// No value is needed: the message type is part of the handler's type.
    pub fn of_handler<M: Message, H: Handler<M>>() -> Option<Self> {
        Self::of::<M>()
    }

    pub(crate) fn from_parts(id: TypeId, name: &'static str) -> Option<Self> {
        is_nominal(name).then_some(Self { id, name })
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    pub fn as_str(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path, generic arguments included.
    pub fn local_name(&self) -> &'static str {
        match split_path(self.name) {
            Some(i) => &self.name[i + 2..],
            None => self.name,
        }
    }

    /// Module path the type is defined in; `None` for unqualified types such as primitives.
    pub fn qualifier(&self) -> Option<&'static str> {
        split_path(self.name).map(|i| &self.name[..i])
    }
}

impl PartialEq for MessageKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MessageKey {}

impl Hash for MessageKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for MessageKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// By name, then by id for types that share a name.
impl Ord for MessageKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(other.name)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Debug for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageKey").field(&self.name).finish()
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name.fmt(f)
    }
}

/// Position of the last `::` before any generic arguments.
fn split_path(name: &str) -> Option<usize> {
    let base_end = name.find('<').unwrap_or(name.len());
    name[..base_end].rfind("::")
}

fn is_nominal(name: &str) -> bool {
    const STRUCTURAL: [&str; 5] = ["dyn ", "fn(", "unsafe ", "extern ", "impl "];

    match name.chars().next() {
        None | Some('&' | '*' | '(' | '[' | '!') => false,
        Some(_) => !STRUCTURAL.iter().any(|prefix| name.starts_with(prefix)),
    }
}

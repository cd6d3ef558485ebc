//! Type-erased scraped items.

use crate::context::Context;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// An application-defined value extracted from a response.
///
/// The engine never looks inside an item; it only dispatches on the
/// [`TypeId`] captured when the item was created.
pub struct Item {
    value: Box<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Item").field(&self.type_name).finish()
    }
}

impl Item {
    /// Wraps `value`. Wrapping an `Item` returns it unchanged.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        let boxed: Box<dyn Any + Send + Sync> = Box::new(value);
        match boxed.downcast::<Item>() {
            Ok(item) => *item,
            Err(value) => Item {
                value,
                type_id: TypeId::of::<T>(),
                type_name: std::any::type_name::<T>(),
            },
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.value.downcast_mut()
    }

    /// Unwraps the item, handing it back untouched when `T` does not match.
    pub fn downcast<T: Any>(self) -> Result<T, Item> {
        let Item {
            value,
            type_id,
            type_name,
        } = self;
        value.downcast::<T>().map(|v| *v).map_err(|value| Item {
            value,
            type_id,
            type_name,
        })
    }
}

/// Item function registered on the crawler. Returning `None` drops the item.
pub type ItemFn = Arc<dyn Fn(Item, &Context) -> Option<Item> + Send + Sync>;

/// An item waiting in the item queue together with the lineage that emitted it.
pub(crate) struct ItemEnvelope {
    pub item: Item,
    pub context: Context,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Quote(String);

    #[test]
    fn dispatch_key_is_the_concrete_type() {
        let item = Item::new(Quote("hi".into()));
        assert!(item.is::<Quote>());
        assert!(!item.is::<String>());
        assert_eq!(item.type_id(), TypeId::of::<Quote>());
        assert!(item.type_name().ends_with("Quote"));
    }

    #[test]
    fn downcast_returns_mismatches_intact() {
        let item = Item::new(Quote("hi".into()));
        let item = item.downcast::<u32>().unwrap_err();
        assert_eq!(item.downcast_ref::<Quote>(), Some(&Quote("hi".into())));
        assert_eq!(item.downcast::<Quote>().unwrap(), Quote("hi".into()));
    }

    #[test]
    fn wrapping_an_item_is_idempotent() {
        let item = Item::new(Item::new(5u8));
        assert!(item.is::<u8>());
    }
}

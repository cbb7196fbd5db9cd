use std::any::Any;
use std::collections::HashMap;

/// A small string-keyed type-erased map exposed to the handler on a [`RequestContext`], for
/// passing per-exchange state between handler stages (e.g. an authenticated-user object).
///
/// [`RequestContext`]: crate::RequestContext
#[derive(Default)]
pub struct ObjectContext {
    objects: HashMap<String, Box<dyn Any + Send>>,
}

impl ObjectContext {
    /// An empty object context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object under `id`, replacing any prior value.
    pub fn insert<T: Any + Send>(&mut self, id: impl Into<String>, value: T) {
        self.objects.insert(id.into(), Box::new(value));
    }

    /// Fetch a reference to the object stored under `id`, if present and of type `T`.
    pub fn get<T: Any + Send>(&self, id: &str) -> Option<&T> {
        self.objects.get(id).and_then(|v| v.downcast_ref())
    }

    /// Fetch a mutable reference to the object stored under `id`, if present and of type `T`.
    pub fn get_mut<T: Any + Send>(&mut self, id: &str) -> Option<&mut T> {
        self.objects.get_mut(id).and_then(|v| v.downcast_mut())
    }

    /// Remove and return the object stored under `id`, if present and of type `T`.
    pub fn remove<T: Any + Send>(&mut self, id: &str) -> Option<T> {
        let boxed = self.objects.remove(id)?;
        match boxed.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(boxed) => {
                self.objects.insert(id.to_string(), boxed);
                None
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_by_id_and_type() {
        let mut ctx = ObjectContext::new();
        ctx.insert("user", "alice".to_string());
        assert_eq!(ctx.get::<String>("user"), Some(&"alice".to_string()));
        assert_eq!(ctx.get::<u32>("user"), None);
        assert_eq!(ctx.remove::<String>("user"), Some("alice".to_string()));
        assert_eq!(ctx.get::<String>("user"), None);
    }
}

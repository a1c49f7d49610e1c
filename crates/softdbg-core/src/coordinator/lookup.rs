use crate::error::{SessionError, SymbolError};
use crate::session::{MethodHandle, TargetSession, TypeHandle};

/// Resolves the method `method_name` of the type `type_name`.
///
/// The type name must match exactly; if several loaded types share it, the
/// first one is used. The type must have exactly one method with the given
/// name.
pub fn resolve_method<S: TargetSession>(
    session: &S,
    type_name: &str,
    method_name: &str,
) -> crate::Result<S::Method, S::Error> {
    let ty = session
        .types(type_name, true)
        .map_err(SessionError)?
        .into_iter()
        .next()
        .ok_or_else(|| SymbolError::TypeNotFound(type_name.to_owned()))?;

    let mut methods: Vec<_> = ty
        .methods()
        .into_iter()
        .filter(|method| method.name() == method_name)
        .collect();

    match methods.len() {
        0 => Err(SymbolError::MethodNotFound {
            type_name: ty.full_name().to_owned(),
            method: method_name.to_owned(),
        }
        .into()),
        1 => {
            let method = methods.swap_remove(0);
            tracing::debug!(method = method.full_name(), "method resolved");
            Ok(method)
        }
        count => Err(SymbolError::AmbiguousMethod {
            type_name: ty.full_name().to_owned(),
            method: method_name.to_owned(),
            count,
        }
        .into()),
    }
}

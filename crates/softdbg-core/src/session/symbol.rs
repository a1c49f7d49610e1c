/// Trait providing functions for working with a type loaded by the debuggee.
pub trait TypeHandle: Send {
    /// Type of the methods of this type.
    type Method: MethodHandle;

    /// Full name of the type (e.g., `Namespace.Program`).
    fn full_name(&self) -> &str;

    /// Returns the methods of the type, in declaration order.
    fn methods(&self) -> Vec<Self::Method>;
}

/// Trait providing functions for working with a method of a loaded type.
pub trait MethodHandle: Send + Sync + 'static {
    /// Name of the method.
    fn name(&self) -> &str;

    /// Full name of the method, including its declaring type.
    fn full_name(&self) -> String;
}

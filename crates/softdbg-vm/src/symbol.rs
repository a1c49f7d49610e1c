use std::sync::Arc;

use softdbg_core::session::{MethodHandle, TypeHandle};

use crate::script::{InvokeBehavior, ScriptMethod, ScriptType};

/// Type loaded by the scripted virtual machine.
#[derive(Clone, Debug)]
pub struct VmType {
    full_name: Arc<str>,
    methods: Vec<VmMethod>,
}

impl VmType {
    pub(crate) fn from_script(ty: &ScriptType) -> Self {
        let full_name: Arc<str> = ty.full_name.as_str().into();

        let methods = ty
            .methods
            .iter()
            .map(|method| VmMethod::from_script(full_name.clone(), method))
            .collect();

        Self { full_name, methods }
    }
}

impl TypeHandle for VmType {
    type Method = VmMethod;

    fn full_name(&self) -> &str {
        &self.full_name
    }

    fn methods(&self) -> Vec<Self::Method> {
        self.methods.clone()
    }
}

/// Method of a [VmType].
#[derive(Clone, Debug)]
pub struct VmMethod {
    declaring_type: Arc<str>,
    name: Arc<str>,
    behavior: Arc<InvokeBehavior>,
}

impl VmMethod {
    fn from_script(declaring_type: Arc<str>, method: &ScriptMethod) -> Self {
        Self {
            declaring_type,
            name: method.name.as_str().into(),
            behavior: Arc::new(method.behavior.clone()),
        }
    }

    pub(crate) fn behavior(&self) -> &InvokeBehavior {
        &self.behavior
    }
}

impl MethodHandle for VmMethod {
    fn name(&self) -> &str {
        &self.name
    }

    fn full_name(&self) -> String {
        format!("{}.{}", self.declaring_type, self.name)
    }
}

//! Request bodies accepted by the controllers.

pub(crate) mod publish;

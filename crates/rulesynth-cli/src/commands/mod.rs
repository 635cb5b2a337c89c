pub(crate) mod fit;
pub(crate) mod helpers;
pub(crate) mod inspect;

pub(crate) mod encdec;
pub(crate) mod layers;

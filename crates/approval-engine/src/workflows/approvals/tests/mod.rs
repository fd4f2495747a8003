mod common;
mod reveal;
mod routing;

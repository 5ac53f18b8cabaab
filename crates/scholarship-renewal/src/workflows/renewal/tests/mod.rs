mod common;
mod notifications;
mod routing;

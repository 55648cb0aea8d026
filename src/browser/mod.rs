pub mod connection;
pub mod headless;

pub use connection::{connect_to_browser, open_form_page};
pub use headless::launch_headless_browser;

use dioxus::launch;
use dioxus::prelude::*;
use dioxus_logger::tracing::Level;

use storefront_ui::NetworkView;

fn main() {
    // Initialize logging for WASM
    wasm_logger::init(wasm_logger::Config::default());
    dioxus_logger::init(Level::INFO).ok();

    launch(App);
}

#[component]
fn App() -> Element {
    rsx! {
        div {
            style: "min-height: 100vh; background-color: #111827; color: white; padding: 1rem;",
            h1 { style: "font-size: 1.1rem; margin: 0 0 1rem 0;", "Server network timing" }
            NetworkView {}
        }
    }
}

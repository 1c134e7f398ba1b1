pub mod handlers;

pub use handlers::{
    ConfigOverrides, LinkGraphView, cache_directory, exit_code, link_graph_view, load_config,
    load_seed_urls, parse_seed_line, render_report, write_json_report,
};

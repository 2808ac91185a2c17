pub mod render_loop;

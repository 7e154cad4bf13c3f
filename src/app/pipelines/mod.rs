pub mod vidclub_to_adls;

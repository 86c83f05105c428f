fn main() {
    trellis::cli::run();
}

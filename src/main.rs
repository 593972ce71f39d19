fn main() {
    queryparser::cli::run();
}

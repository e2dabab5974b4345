fn main() {
  if let Err(e) = tempwatch_lib::run() {
    eprintln!("Error: {:#}", e);
    std::process::exit(1);
  }
}

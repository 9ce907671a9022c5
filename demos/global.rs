use segalloc::MemAlloc;

#[global_allocator]
static ALLOCATOR: MemAlloc = MemAlloc::new();

fn main() {
    let mut v = Vec::new();
    for i in 0..1000 {
        v.push(i);
    }

    println!("sum = {}", v.iter().sum::<i32>());

    let boxed = Box::new([0u8; 4096]);
    println!("boxed len = {}", boxed.len());
}
